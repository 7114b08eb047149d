use log::debug;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr};
use tokio::net::{TcpListener, UdpSocket};

use crate::utils::{P2PError, Result};

/// Public address used only to pick the outbound interface; nothing is sent to it.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

pub struct NodeUtils;

impl NodeUtils {
    /// Create a TCP listener with SO_REUSEADDR so a restarted node can rebind
    /// its port while old connections linger in TIME_WAIT.
    pub async fn create_reusable_tcp_listener(addr: SocketAddr) -> Result<TcpListener> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| P2PError::NetworkError(format!("Failed to create socket: {}", e)))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set reuse_address: {}", e)))?;

        socket
            .bind(&addr.into())
            .map_err(|e| P2PError::NetworkError(format!("Failed to bind to {}: {}", addr, e)))?;

        socket
            .listen(128)
            .map_err(|e| P2PError::NetworkError(format!("Failed to listen on {}: {}", addr, e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| P2PError::NetworkError(format!("Failed to set nonblocking: {}", e)))?;

        let std_listener: std::net::TcpListener = socket.into();
        TcpListener::from_std(std_listener).map_err(|e| {
            P2PError::NetworkError(format!("Failed to convert to tokio listener: {}", e))
        })
    }

    /// Find the IPv4 address of the interface that routes off-host.
    pub async fn local_ipv4() -> Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(ROUTE_PROBE_ADDR).await.map_err(|e| {
            P2PError::NetworkError(format!("No route to determine local address: {}", e))
        })?;

        let ip = socket.local_addr()?.ip();
        if ip.is_unspecified() || ip.is_loopback() {
            return Err(P2PError::NetworkError(format!(
                "Unusable local address {}",
                ip
            )));
        }

        debug!("Detected local address {}", ip);
        Ok(ip)
    }

    /// mDNS host name for a node, e.g. `Office-PC` -> `Office-PC.local.`
    pub fn mdns_host_name(node_name: &str) -> String {
        let label: String = node_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let label = label.trim_matches('-');

        if label.is_empty() {
            "p2pfile.local.".to_string()
        } else {
            format!("{}.local.", label)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdns_host_name() {
        assert_eq!(NodeUtils::mdns_host_name("RustPeer"), "RustPeer.local.");
        assert_eq!(NodeUtils::mdns_host_name("my laptop"), "my-laptop.local.");
        assert_eq!(NodeUtils::mdns_host_name("  "), "p2pfile.local.");
    }

    #[tokio::test]
    async fn test_reusable_listener_binds_ephemeral_port() {
        let listener = NodeUtils::create_reusable_tcp_listener("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
