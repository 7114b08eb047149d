use std::sync::Arc;

use crate::core::{PeerRecord, PeerRegistry};
use crate::transfer::{PeerClient, PullOutcome, PushOutcome};
use crate::utils::Result;

/// Turns human-entered peer names into protocol client calls. A name that
/// resolves to nobody fails with `PeerNotFound` before any connection is made.
pub struct Dispatcher {
    registry: Arc<PeerRegistry>,
    client: PeerClient,
}

impl Dispatcher {
    pub fn new(registry: Arc<PeerRegistry>, client: PeerClient) -> Self {
        Self { registry, client }
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// List a peer's files and cache the result as its current listing.
    pub async fn list(&self, peer: &str) -> Result<(PeerRecord, Vec<String>)> {
        let record = self.registry.resolve(peer).await?;
        let files = self.client.list(record.addr).await?;
        self.registry.store_listing(record.addr, files.clone()).await;
        Ok((record, files))
    }

    pub async fn request(&self, peer: &str, file: &str) -> Result<(PeerRecord, PullOutcome)> {
        let record = self.registry.resolve(peer).await?;
        let outcome = self.client.pull(record.addr, file).await?;
        Ok((record, outcome))
    }

    pub async fn send(&self, peer: &str, file: &str) -> Result<(PeerRecord, PushOutcome)> {
        let record = self.registry.resolve(peer).await?;
        let outcome = self.client.push(record.addr, file).await?;
        Ok((record, outcome))
    }
}
