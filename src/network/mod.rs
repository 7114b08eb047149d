pub mod discovery;
pub mod transport;

pub use discovery::{Discovery, DiscoveryEvent};
pub use transport::Transport;
