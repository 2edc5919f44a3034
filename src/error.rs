//! Error types for TideKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TideError
pub type Result<T> = std::result::Result<T, TideError>;

/// Unified error type for TideKV operations
#[derive(Debug, Error)]
pub enum TideError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    /// Checksum mismatch or truncated record found during replay
    #[error("log corruption at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("storage is closed")]
    StorageClosed,

    /// Key or value longer than the configured limit
    #[error("entry field of {len} bytes exceeds limit of {limit}")]
    EntryTooLarge { len: usize, limit: usize },

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    /// No-wait acquisition or timestamp validation failed. The owning
    /// transaction has already been aborted when this is returned.
    #[error("lock conflict on key {key:?}: {reason}")]
    LockConflict { key: Vec<u8>, reason: &'static str },

    #[error("transaction not active")]
    InactiveTransaction,

    // -------------------------------------------------------------------------
    // Value Errors
    // -------------------------------------------------------------------------
    /// Stored value is not a 4-byte big-endian integer
    #[error("invalid counter value: expected 4 bytes, found {len}")]
    InvalidCounter { len: usize },
}

impl TideError {
    pub(crate) fn corruption(offset: u64, reason: impl Into<String>) -> Self {
        TideError::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(key: &[u8], reason: &'static str) -> Self {
        TideError::LockConflict {
            key: key.to_vec(),
            reason,
        }
    }

    /// True for errors that merely mean "abort and retry the transaction"
    pub fn is_conflict(&self) -> bool {
        matches!(self, TideError::LockConflict { .. })
    }
}
