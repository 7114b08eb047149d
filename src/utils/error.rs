use thiserror::Error;

pub type Result<T> = std::result::Result<T, P2PError>;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Peer not found: {query}. Discovered peers: {known:?}")]
    PeerNotFound { query: String, known: Vec<String> },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<std::io::Error> for P2PError {
    fn from(err: std::io::Error) -> Self {
        P2PError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for P2PError {
    fn from(err: serde_json::Error) -> Self {
        P2PError::SerializationError(err.to_string())
    }
}

impl From<mdns_sd::Error> for P2PError {
    fn from(err: mdns_sd::Error) -> Self {
        P2PError::DiscoveryError(err.to_string())
    }
}
