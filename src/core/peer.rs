use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use tokio::sync::RwLock;

use crate::utils::{P2PError, Result};

/// A discovered peer: its advertised instance name and where it listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub name: String,
    pub addr: SocketAddr,
}

impl PeerRecord {
    pub fn new(name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            addr,
        }
    }

    /// Registry key, `host:port`.
    pub fn key(&self) -> String {
        self.addr.to_string()
    }

    /// Instance label without the service type, e.g. `PythonPeer` for
    /// `PythonPeer._p2pfile._tcp.local.`
    pub fn display_name(&self) -> &str {
        match self.name.find("._") {
            Some(idx) => &self.name[..idx],
            None => &self.name,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    peers: BTreeMap<SocketAddr, PeerRecord>,
    listings: HashMap<SocketAddr, Vec<String>>,
}

impl RegistryState {
    fn drop_peer(&mut self, addr: &SocketAddr) -> Option<PeerRecord> {
        self.listings.remove(addr);
        self.peers.remove(addr)
    }
}

/// Live view of the peers announced on the network and the last listing
/// fetched from each. All access goes through one lock, so a removal takes
/// the record and its listing away together.
#[derive(Default)]
pub struct PeerRegistry {
    state: RwLock<RegistryState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Returns false when it only repeated what was
    /// already known.
    pub async fn upsert(&self, name: &str, addr: SocketAddr) -> bool {
        let mut state = self.state.write().await;

        if let Some(existing) = state.peers.get(&addr) {
            if existing.name == name {
                debug!("Duplicate announcement for {} at {}", name, addr);
                return false;
            }
            info!("{} now announced by {} (was {})", addr, name, existing.name);
            state.drop_peer(&addr);
        }

        let moved: Vec<SocketAddr> = state
            .peers
            .values()
            .filter(|record| record.name == name)
            .map(|record| record.addr)
            .collect();
        for old_addr in moved {
            debug!("{} moved from {} to {}", name, old_addr, addr);
            state.drop_peer(&old_addr);
        }

        state.peers.insert(addr, PeerRecord::new(name, addr));
        true
    }

    /// Forget every record announced under `name`, along with its listing.
    pub async fn remove_by_name(&self, name: &str) -> Vec<PeerRecord> {
        let mut state = self.state.write().await;

        let addrs: Vec<SocketAddr> = state
            .peers
            .values()
            .filter(|record| record.name == name)
            .map(|record| record.addr)
            .collect();

        addrs
            .iter()
            .filter_map(|addr| state.drop_peer(addr))
            .collect()
    }

    /// Every peer whose advertised name contains `query`, in key order.
    pub async fn matching(&self, query: &str) -> Vec<PeerRecord> {
        if query.is_empty() {
            return Vec::new();
        }
        let state = self.state.read().await;
        state
            .peers
            .values()
            .filter(|record| record.name.contains(query))
            .cloned()
            .collect()
    }

    /// Resolve a short, human-entered name. The first match in key order
    /// wins; ambiguity is logged rather than resolved.
    pub async fn resolve(&self, query: &str) -> Result<PeerRecord> {
        let mut matches = self.matching(query).await;

        if matches.is_empty() {
            return Err(P2PError::PeerNotFound {
                query: query.to_string(),
                known: self.names().await,
            });
        }

        if matches.len() > 1 {
            let all: Vec<String> = matches
                .iter()
                .map(|record| format!("{} ({})", record.name, record.key()))
                .collect();
            warn!(
                "{:?} matches {} peers: {}. Using the first.",
                query,
                matches.len(),
                all.join(", ")
            );
        }

        Ok(matches.swap_remove(0))
    }

    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.state.read().await.peers.values().cloned().collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .peers
            .values()
            .map(|record| record.name.clone())
            .collect()
    }

    pub async fn get(&self, addr: &SocketAddr) -> Option<PeerRecord> {
        self.state.read().await.peers.get(addr).cloned()
    }

    /// Replace the cached listing for a peer. Ignored (returns false) when
    /// the peer was removed while the listing was in flight.
    pub async fn store_listing(&self, addr: SocketAddr, files: Vec<String>) -> bool {
        let mut state = self.state.write().await;
        if !state.peers.contains_key(&addr) {
            debug!("Dropping listing for departed peer {}", addr);
            return false;
        }
        state.listings.insert(addr, files);
        true
    }

    pub async fn listing(&self, addr: &SocketAddr) -> Option<Vec<String>> {
        self.state.read().await.listings.get(addr).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_duplicate() {
        let registry = PeerRegistry::new();
        assert!(registry.upsert("JavaPeer._p2pfile._tcp.local.", addr("10.0.0.2:5001")).await);
        assert!(!registry.upsert("JavaPeer._p2pfile._tcp.local.", addr("10.0.0.2:5001")).await);
        assert_eq!(registry.len().await, 1);

        let record = registry.get(&addr("10.0.0.2:5001")).await.unwrap();
        assert_eq!(record.key(), "10.0.0.2:5001");
        assert_eq!(record.display_name(), "JavaPeer");
    }

    #[tokio::test]
    async fn test_key_taken_over_by_new_name_drops_listing() {
        let registry = PeerRegistry::new();
        let key = addr("10.0.0.2:5000");
        registry.upsert("Old._p2pfile._tcp.local.", key).await;
        assert!(registry.store_listing(key, vec!["a.txt".to_string()]).await);

        registry.upsert("New._p2pfile._tcp.local.", key).await;
        assert_eq!(registry.get(&key).await.unwrap().name, "New._p2pfile._tcp.local.");
        assert_eq!(registry.listing(&key).await, None);
    }

    #[tokio::test]
    async fn test_same_name_new_address_replaces_old_record() {
        let registry = PeerRegistry::new();
        registry.upsert("Laptop._p2pfile._tcp.local.", addr("10.0.0.2:5000")).await;
        registry.upsert("Laptop._p2pfile._tcp.local.", addr("10.0.0.9:5000")).await;

        let peers = registry.peers().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].addr, addr("10.0.0.9:5000"));
    }

    #[tokio::test]
    async fn test_remove_purges_record_and_listing() {
        let registry = PeerRegistry::new();
        let key = addr("10.0.0.3:5000");
        registry.upsert("PythonPeer._p2pfile._tcp.local.", key).await;
        registry.store_listing(key, vec!["notes.txt".to_string()]).await;

        let removed = registry.remove_by_name("PythonPeer._p2pfile._tcp.local.").await;
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.listing(&key).await, None);
        assert!(registry.is_empty().await);

        assert!(matches!(
            registry.resolve("PythonPeer").await,
            Err(P2PError::PeerNotFound { .. })
        ));
        assert!(!registry.store_listing(key, vec![]).await);
        assert_eq!(registry.listing(&key).await, None);
    }

    #[tokio::test]
    async fn test_remove_unknown_name_is_noop() {
        let registry = PeerRegistry::new();
        registry.upsert("A._p2pfile._tcp.local.", addr("10.0.0.4:5000")).await;
        assert!(registry.remove_by_name("B._p2pfile._tcp.local.").await.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_substring_first_match_in_key_order() {
        let registry = PeerRegistry::new();
        registry.upsert("PythonPeer._p2pfile._tcp.local.", addr("10.0.0.8:5000")).await;
        registry.upsert("PythonPeer2._p2pfile._tcp.local.", addr("10.0.0.5:5000")).await;
        registry.upsert("JavaPeer._p2pfile._tcp.local.", addr("10.0.0.6:5001")).await;

        let record = registry.resolve("Java").await.unwrap();
        assert_eq!(record.addr, addr("10.0.0.6:5001"));

        let record = registry.resolve("Python").await.unwrap();
        assert_eq!(record.addr, addr("10.0.0.5:5000"));
        assert_eq!(registry.matching("Python").await.len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_not_found_lists_known_names() {
        let registry = PeerRegistry::new();
        registry.upsert("JavaPeer._p2pfile._tcp.local.", addr("10.0.0.6:5001")).await;

        match registry.resolve("Rust").await {
            Err(P2PError::PeerNotFound { query, known }) => {
                assert_eq!(query, "Rust");
                assert_eq!(known, vec!["JavaPeer._p2pfile._tcp.local.".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(registry.resolve("").await.is_err());
    }
}
