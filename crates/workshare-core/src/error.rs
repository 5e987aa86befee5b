//! Error types for the workshare engine

use std::net::SocketAddr;

use thiserror::Error;

use crate::discovery::DiscoveryState;

/// Main error type for workshare operations
#[derive(Error, Debug)]
pub enum CollabError {
    /// A discovery socket could not be bound (fatal at start)
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while the service was not stopped
    #[error("Discovery service is already active (state: {0})")]
    AlreadyRunning(DiscoveryState),

    /// Operation requires a running service
    #[error("Discovery service is not running")]
    NotRunning,

    /// Datagram did not decode as a discovery packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using CollabError
pub type CollabResult<T> = Result<T, CollabError>;
