pub mod client;
pub mod server;


pub use client::{PeerClient, PullOutcome, PushOutcome};
pub use server::{DenyReason, RequestHandler, Served, Server};
