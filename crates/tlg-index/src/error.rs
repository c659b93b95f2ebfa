//! Error types for the index crate.

use tlg_types::{LogId, TxId};

/// Errors that can occur while building or loading the record index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A transaction breaks the CREATE → UPDATE* → DELETE? lifecycle of its record.
    #[error("{tx_id} violates the lifecycle of {log_id}: {reason}")]
    Lifecycle {
        log_id: LogId,
        tx_id: TxId,
        reason: &'static str,
    },

    /// A block was applied out of chain order.
    #[error("expected block {expected}, got {found}")]
    OutOfSequence { expected: u64, found: u64 },

    /// A stored payload is not valid JSON.
    #[error("payload of {tx_id} cannot be decoded: {reason}")]
    Payload { tx_id: TxId, reason: String },

    /// Chain store read failed during replay.
    #[error("store error: {0}")]
    Store(#[from] tlg_store::StoreError),

    /// Checkpoint file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
