//! LAN peer-to-peer file sharing.
//!
//! Peers find each other over mDNS and exchange files from a shared
//! directory with a small line protocol. Every inbound transfer needs the
//! operator's approval.

pub mod core;
pub mod network;
pub mod storage;
pub mod transfer;
pub mod utils;

// Re-export main types
pub use core::{Config, Dispatcher, Node, PeerRegistry};
pub use network::Discovery;
pub use storage::FileManager;
pub use transfer::{PeerClient, PullOutcome, PushOutcome};
pub use utils::{
    NodeUtils,
    error::{P2PError, Result},
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
