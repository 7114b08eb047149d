use log::{info, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::consent::{ConsentBroker, PendingConsent};
use crate::core::console::{Console, spawn_stdin_reader};
use crate::core::{Config, Dispatcher, PeerRegistry};
use crate::network::Discovery;
use crate::storage::FileManager;
use crate::transfer::{PeerClient, RequestHandler, Server};
use crate::utils::{NodeUtils, P2PError, Result};

/// One running peer: connection server, discovery and the operator console,
/// all sharing a single peer registry and shared directory.
pub struct Node {
    id: Uuid,
    pub config: Config,
    local_addr: SocketAddr,
    discovery: Arc<Discovery>,
    dispatcher: Arc<Dispatcher>,
    server: Option<Server>,
    consents: Option<mpsc::Receiver<PendingConsent>>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let id = Uuid::new_v4();

        let files = Arc::new(FileManager::new(config.shared_dir.clone()).await?);
        let registry = Arc::new(PeerRegistry::new());
        let (broker, consents) = ConsentBroker::new(config.consent_timeout());

        let listener =
            NodeUtils::create_reusable_tcp_listener(SocketAddr::from(([0, 0, 0, 0], config.port)))
                .await?;
        let handler = Arc::new(RequestHandler::new(files.clone(), Arc::new(broker)));
        let server = Server::new(listener, handler);
        let local_addr = server.local_addr()?;

        let discovery = Arc::new(Discovery::new(&config, registry.clone())?);
        let client = PeerClient::new(files, config.io_timeout());
        let dispatcher = Arc::new(Dispatcher::new(registry, client));

        Ok(Self {
            id,
            config,
            local_addr,
            discovery,
            dispatcher,
            server: Some(server),
            consents: Some(consents),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve, advertise and browse, then hand the terminal to the console
    /// until the operator exits or Ctrl+C arrives.
    pub async fn start(&mut self) -> Result<()> {
        let (Some(server), Some(consents)) = (self.server.take(), self.consents.take()) else {
            return Err(P2PError::NetworkError("node already started".to_string()));
        };

        info!(
            "Starting P2P node {} ({}) on port {}",
            self.id,
            self.config.node_name,
            self.local_addr.port()
        );
        info!("Sharing files from {}", self.config.shared_dir.display());

        let server_task = tokio::spawn(server.run());

        let ip = self.advertise_ip().await;
        self.discovery.advertise(ip, self.local_addr.port())?;
        let browse_task = self.discovery.browse()?;

        let console = Console::new(self.dispatcher.clone());
        tokio::select! {
            _ = console.run(spawn_stdin_reader(), consents) => {
                info!("Console closed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
            }
        }

        self.shutdown().await;
        browse_task.abort();
        server_task.abort();
        Ok(())
    }

    async fn advertise_ip(&self) -> Option<IpAddr> {
        if let Some(ip) = self.config.advertise_ip {
            return Some(ip);
        }
        match NodeUtils::local_ipv4().await {
            Ok(ip) => Some(ip),
            Err(e) => {
                warn!("Could not detect a LAN address ({}), announcing on all interfaces", e);
                None
            }
        }
    }

    /// Withdraw the mDNS announcement and stop the discovery daemon.
    pub async fn shutdown(&self) {
        info!("Stopping node {}", self.config.node_name);
        self.discovery.shutdown().await;
    }
}
