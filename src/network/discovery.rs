use log::{debug, info, warn};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::{Config, PeerRegistry};
use crate::utils::{NodeUtils, Result};

/// How long shutdown waits for the goodbye packets to go out.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Peer lifecycle as seen through the discovery transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    PeerAdded { name: String, addr: SocketAddr },
    PeerRemoved { name: String },
}

/// Announces this node under the shared service type and keeps the
/// [`PeerRegistry`] in step with other announcements.
pub struct Discovery {
    daemon: ServiceDaemon,
    service_type: String,
    node_name: String,
    own_fullname: String,
    description: String,
    registry: Arc<PeerRegistry>,
}

impl Discovery {
    pub fn new(config: &Config, registry: Arc<PeerRegistry>) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        Ok(Self {
            daemon,
            service_type: config.service_type.clone(),
            node_name: config.node_name.clone(),
            own_fullname: config.service_fullname(),
            description: config.description.clone(),
            registry,
        })
    }

    /// Register our own service once. Without an explicit address the
    /// daemon announces every interface address it finds.
    pub fn advertise(&self, ip: Option<IpAddr>, port: u16) -> Result<()> {
        let host_name = NodeUtils::mdns_host_name(&self.node_name);
        let properties = [("desc", self.description.as_str())];

        let service = match ip {
            Some(ip) => ServiceInfo::new(
                &self.service_type,
                &self.node_name,
                &host_name,
                ip,
                port,
                &properties[..],
            )?,
            None => ServiceInfo::new(
                &self.service_type,
                &self.node_name,
                &host_name,
                "",
                port,
                &properties[..],
            )?
            .enable_addr_auto(),
        };

        self.daemon.register(service)?;
        match ip {
            Some(ip) => info!("Registered {} at {}:{}", self.own_fullname, ip, port),
            None => info!("Registered {} on port {} (all interfaces)", self.own_fullname, port),
        }
        Ok(())
    }

    /// Subscribe to the service type and apply every event to the registry
    /// on a background task.
    pub fn browse(&self) -> Result<JoinHandle<()>> {
        let receiver = self.daemon.browse(&self.service_type)?;
        let registry = self.registry.clone();
        let own_fullname = self.own_fullname.clone();
        info!("Browsing for {}", self.service_type);

        Ok(tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                if let Some(event) = translate_event(event) {
                    apply_event(&registry, &own_fullname, event).await;
                }
            }
            debug!("Discovery event stream closed");
        }))
    }

    /// Withdraw our announcement and stop the daemon.
    pub async fn shutdown(&self) {
        match self.daemon.unregister(&self.own_fullname) {
            Ok(status) => {
                if tokio::time::timeout(SHUTDOWN_GRACE, status.recv_async())
                    .await
                    .is_err()
                {
                    debug!("Unregister of {} not confirmed in time", self.own_fullname);
                }
            }
            Err(e) => warn!("Failed to unregister {}: {}", self.own_fullname, e),
        }

        match self.daemon.shutdown() {
            Ok(status) => {
                let _ = tokio::time::timeout(SHUTDOWN_GRACE, status.recv_async()).await;
                info!("Discovery stopped");
            }
            Err(e) => warn!("Failed to stop discovery daemon: {}", e),
        }
    }
}

/// Keep the events the registry cares about; everything else is noise.
pub fn translate_event(event: ServiceEvent) -> Option<DiscoveryEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let Some(ip) = pick_address(info.get_addresses().iter().copied()) else {
                debug!("No address available for {}", info.get_fullname());
                return None;
            };
            Some(DiscoveryEvent::PeerAdded {
                name: info.get_fullname().to_string(),
                addr: SocketAddr::new(ip, info.get_port()),
            })
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            Some(DiscoveryEvent::PeerRemoved { name: fullname })
        }
        ServiceEvent::ServiceFound(_, fullname) => {
            debug!("Service found: {}", fullname);
            None
        }
        other => {
            debug!("Ignoring discovery event {:?}", other);
            None
        }
    }
}

/// Prefer IPv4, and pick the lowest address so repeated resolutions agree.
pub fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .filter(|ip| ip.is_ipv4())
        .min()
        .or_else(|| addrs.iter().min())
        .copied()
}

pub async fn apply_event(registry: &PeerRegistry, own_fullname: &str, event: DiscoveryEvent) {
    match event {
        DiscoveryEvent::PeerAdded { name, addr } => {
            if name == own_fullname {
                return;
            }
            if registry.upsert(&name, addr).await {
                info!("Discovered peer: {} at {}", name, addr);
            }
        }
        DiscoveryEvent::PeerRemoved { name } => {
            for record in registry.remove_by_name(&name).await {
                info!("Service removed: {} ({})", record.name, record.key());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE_TYPE: &str = "_p2pfile._tcp.local.";

    fn resolved(name: &str, ip: &str, port: u16) -> ServiceEvent {
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            name,
            "peer-host.local.",
            ip,
            port,
            &[("desc", "test")][..],
        )
        .unwrap();
        ServiceEvent::ServiceResolved(info)
    }

    #[test]
    fn test_translate_resolved() {
        let event = translate_event(resolved("JavaPeer", "192.168.1.7", 5001)).unwrap();
        assert_eq!(
            event,
            DiscoveryEvent::PeerAdded {
                name: "JavaPeer._p2pfile._tcp.local.".to_string(),
                addr: "192.168.1.7:5001".parse().unwrap(),
            }
        );
    }

    #[test]
    fn test_translate_removed_and_noise() {
        let removed = ServiceEvent::ServiceRemoved(
            SERVICE_TYPE.to_string(),
            "JavaPeer._p2pfile._tcp.local.".to_string(),
        );
        assert_eq!(
            translate_event(removed),
            Some(DiscoveryEvent::PeerRemoved {
                name: "JavaPeer._p2pfile._tcp.local.".to_string()
            })
        );
        assert_eq!(
            translate_event(ServiceEvent::SearchStarted(SERVICE_TYPE.to_string())),
            None
        );
    }

    #[test]
    fn test_pick_address_prefers_ipv4() {
        let v6: IpAddr = "fe80::1".parse().unwrap();
        let high: IpAddr = "192.168.1.9".parse().unwrap();
        let low: IpAddr = "10.0.0.4".parse().unwrap();

        assert_eq!(pick_address([v6, high, low]), Some(low));
        assert_eq!(pick_address([v6]), Some(v6));
        assert_eq!(pick_address(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_apply_event_ignores_self() {
        let registry = PeerRegistry::new();
        let own = "RustPeer._p2pfile._tcp.local.";

        apply_event(
            &registry,
            own,
            DiscoveryEvent::PeerAdded {
                name: own.to_string(),
                addr: "10.0.0.1:5000".parse().unwrap(),
            },
        )
        .await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_apply_event_add_then_remove() {
        let registry = PeerRegistry::new();
        let own = "RustPeer._p2pfile._tcp.local.";
        let name = "PythonPeer._p2pfile._tcp.local.".to_string();
        let addr: SocketAddr = "10.0.0.2:5000".parse().unwrap();

        apply_event(&registry, own, DiscoveryEvent::PeerAdded { name: name.clone(), addr }).await;
        registry.store_listing(addr, vec!["notes.txt".to_string()]).await;
        assert_eq!(registry.resolve("Python").await.unwrap().addr, addr);

        apply_event(&registry, own, DiscoveryEvent::PeerRemoved { name: name.clone() }).await;
        apply_event(&registry, own, DiscoveryEvent::PeerRemoved { name }).await;
        assert!(registry.is_empty().await);
        assert_eq!(registry.listing(&addr).await, None);
    }
}
