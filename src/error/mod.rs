//! Error handling for the peer network
//!
//! Validation failures are deterministic results, never faults, so nothing in
//! here is ever retried. Storage errors stay local to the persistence sink.

use std::fmt;

/// Result type alias for chain and network operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// A block failed hash integrity, parent linkage or difficulty
    Validation(String),
    /// A peer's replayed chain failed validation while connecting
    InvalidPeerChain { peer: String, reason: String },
    /// Connection torn down because the peer's chain became invalid
    PeerDisconnected { peer: String },
    /// The node has shut down and no longer accepts work
    Node(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Configuration errors
    Config(String),
    /// Clock and digest errors
    Crypto(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Validation(msg) => write!(f, "Validation failure: {msg}"),
            BlockchainError::InvalidPeerChain { peer, reason } => {
                write!(f, "Invalid peer chain from {peer}: {reason}")
            }
            BlockchainError::PeerDisconnected { peer } => {
                write!(f, "Peer {peer} disconnected due to invalid chain")
            }
            BlockchainError::Node(msg) => write!(f, "Node error: {msg}"),
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl BlockchainError {
    /// Whether the error ends a single peer relationship rather than the node
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            BlockchainError::InvalidPeerChain { .. } | BlockchainError::PeerDisconnected { .. }
        )
    }
}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}
