//! Error types for ReconKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ReconError
pub type Result<T> = std::result::Result<T, ReconError>;

/// Unified error type for ReconKV operations
#[derive(Debug, Error)]
pub enum ReconError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Key was removed")]
    KeyRemoved,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Index encoding error: {0}")]
    Encoding(String),

    #[error("Corrupt record in partition {id} at offset {offset}: {reason}")]
    Corruption {
        id: u64,
        offset: u64,
        reason: String,
    },

    #[error("Partition {0} is sealed and cannot be written")]
    PartitionSealed(u64),

    #[error("Unknown partition {0}")]
    UnknownPartition(u64),

    #[error("Partition ids exhausted (last id {0})")]
    IdsExhausted(u64),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconError {
    /// True for [`ReconError::KeyNotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconError::KeyNotFound)
    }

    /// True for [`ReconError::KeyRemoved`]
    pub fn is_removed(&self) -> bool {
        matches!(self, ReconError::KeyRemoved)
    }
}

impl From<bincode::Error> for ReconError {
    fn from(e: bincode::Error) -> Self {
        match *e {
            bincode::ErrorKind::Io(io) => ReconError::Io(io),
            other => ReconError::Encoding(other.to_string()),
        }
    }
}
