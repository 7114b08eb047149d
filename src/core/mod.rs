pub mod config;
pub mod consent;
pub mod console;
pub mod dispatcher;
pub mod node;
pub mod peer;
pub mod protocol;

pub use config::Config;
pub use consent::{AutoConsent, Consent, ConsentBroker, ConsentRequest, Decision, TransferKind};
pub use console::Console;
pub use dispatcher::Dispatcher;
pub use node::Node;
pub use peer::{PeerRecord, PeerRegistry};
pub use protocol::{Command, Reply};
