use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{P2PError, Result};

pub const DEFAULT_SERVICE_TYPE: &str = "_p2pfile._tcp.local.";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instance name announced over mDNS; peers resolve it by substring.
    pub node_name: String,
    /// TCP port for the connection server. 0 picks an ephemeral port.
    pub port: u16,
    pub shared_dir: PathBuf,
    pub service_type: String,
    /// Value of the `desc` TXT property. Informational only.
    pub description: String,
    /// Address to announce. Detected from the routing table when unset.
    pub advertise_ip: Option<IpAddr>,
    /// Bound on outbound connect and each outbound read.
    pub io_timeout_secs: u64,
    /// How long an inbound transfer waits for the operator before it is denied.
    pub consent_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "RustPeer".to_string(),
            port: DEFAULT_PORT,
            shared_dir: PathBuf::from("./shared"),
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            description: "P2P File Sharing Peer".to_string(),
            advertise_ip: None,
            io_timeout_secs: 30,
            consent_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            P2PError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(P2PError::ConfigError("node_name must not be empty".to_string()));
        }
        if !self.service_type.ends_with("._tcp.local.") {
            return Err(P2PError::ConfigError(format!(
                "service_type {:?} must end with \"._tcp.local.\"",
                self.service_type
            )));
        }
        if self.io_timeout_secs == 0 || self.consent_timeout_secs == 0 {
            return Err(P2PError::ConfigError("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(self.consent_timeout_secs)
    }

    /// Full mDNS instance name, e.g. `RustPeer._p2pfile._tcp.local.`
    pub fn service_fullname(&self) -> String {
        format!("{}.{}", self.node_name, self.service_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_fullname(), "RustPeer._p2pfile._tcp.local.");
        assert_eq!(config.io_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.node_name = " ".to_string();
        assert!(matches!(config.validate(), Err(P2PError::ConfigError(_))));

        let mut config = Config::default();
        config.service_type = "_p2pfile._udp.local.".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.consent_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"node_name": "Laptop", "port": 6000}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.node_name, "Laptop");
        assert_eq!(config.port, 6000);
        assert_eq!(config.service_type, DEFAULT_SERVICE_TYPE);
        assert_eq!(config.consent_timeout_secs, 60);
    }
}
