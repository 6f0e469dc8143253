//! Error handling for the node
//!
//! One error enum covers every layer: the embedded store, ledger integrity,
//! gossip decoding, networking and configuration. Callers decide whether an
//! error is fatal; see `Node` for how each kind is treated.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Ledger consistency failures found while validating stored data.
///
/// These are never repaired automatically. Every variant names what was
/// expected and what was actually found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// Block heights are not dense starting from zero
    HeightMismatch { expected: u64, actual: u64 },
    /// A block's previous hash does not match its predecessor's hash
    BrokenLink {
        height: u64,
        expected: String,
        actual: String,
    },
    /// The block stored at height zero is not the genesis sentinel
    BadGenesis { expected: String, actual: String },
    /// A confirmed transaction references a block that is not stored
    OrphanTransaction { hash: String, block_height: u64 },
    /// The cursor exists but there are no blocks to validate it against
    EmptyLedger { cursor: u64 },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::HeightMismatch { expected, actual } => {
                write!(
                    f,
                    "mismatched block height, expected {expected}, got {actual}"
                )
            }
            IntegrityError::BrokenLink {
                height,
                expected,
                actual,
            } => write!(
                f,
                "chain is broken at block {height}: expected previous hash '{expected}', got '{actual}'"
            ),
            IntegrityError::BadGenesis { expected, actual } => {
                write!(f, "bad genesis block: expected '{expected}', got '{actual}'")
            }
            IntegrityError::OrphanTransaction { hash, block_height } => write!(
                f,
                "orphaned transaction '{hash}': block {block_height} is not stored"
            ),
            IntegrityError::EmptyLedger { cursor } => write!(
                f,
                "status points at block {cursor} but the block store is empty"
            ),
        }
    }
}

/// Error types for node operations
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// Embedded store errors (open, read, write, flush)
    Database(String),
    /// A key that was looked up is not present
    NotFound(String),
    /// The store was used after it was closed
    StoreClosed,
    /// Stored ledger data failed validation
    ChainIntegrity(IntegrityError),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Configuration errors
    Config(String),
    /// Unknown node mode
    InvalidMode(String),
    /// Serialization errors
    Serialization(String),
    /// Inbound data that could not be decoded
    Decode(String),
    /// File I/O errors
    Io(String),
    /// Invalid address format
    InvalidAddress(String),
}

impl BlockchainError {
    /// True for the expected "key absent" condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlockchainError::NotFound(_))
    }
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Database(msg) => write!(f, "Database error: {msg}"),
            BlockchainError::NotFound(key) => write!(f, "Not found: {key}"),
            BlockchainError::StoreClosed => write!(f, "Database error: store is closed"),
            BlockchainError::ChainIntegrity(err) => write!(f, "Chain integrity error: {err}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::InvalidMode(mode) => write!(
                f,
                "Invalid node mode: '{mode}' (expected dns, seed, supernode or node)"
            ),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Decode(msg) => write!(f, "Decode error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<IntegrityError> for BlockchainError {
    fn from(err: IntegrityError) -> Self {
        BlockchainError::ChainIntegrity(err)
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
        BlockchainError::Decode(err.to_string())
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

impl From<toml::ser::Error> for BlockchainError {
    fn from(err: toml::ser::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_names_expected_and_actual() {
        let err: BlockchainError = IntegrityError::BrokenLink {
            height: 4,
            expected: "BAAA".to_string(),
            actual: "BBBB".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("block 4"));
        assert!(msg.contains("BAAA"));
        assert!(msg.contains("BBBB"));
    }

    #[test]
    fn test_not_found_is_distinct_from_database() {
        assert!(BlockchainError::NotFound("block:1".to_string()).is_not_found());
        assert!(!BlockchainError::Database("disk full".to_string()).is_not_found());
    }
}
