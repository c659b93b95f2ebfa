use std::path::PathBuf;
use std::time::Duration;

use tlg_crypto::CanonicalError;
use tlg_types::TxId;

/// Errors from chain store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The write did not complete within the configured bound.
    #[error("append exceeded the {limit:?} write timeout")]
    Timeout { limit: Duration },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Block contents could not be canonically encoded for hashing.
    #[error("encoding error: {0}")]
    Encoding(#[from] CanonicalError),

    /// `append` was called with no transactions.
    #[error("cannot append an empty block")]
    EmptyBatch,

    /// A transaction id does not follow the chain's last transaction id.
    #[error("transaction {tx_id} does not follow {last:?}")]
    TxOutOfOrder { tx_id: TxId, last: Option<TxId> },

    /// The segment file holds a frame that cannot be trusted.
    #[error("corrupt segment at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Another handle, in this process or another, already owns the segment.
    #[error("segment {} is locked by another writer", path.display())]
    Locked { path: PathBuf },

    /// A failed append could not be rolled back; the segment must be
    /// reopened before it accepts writes again.
    #[error("segment is unusable until reopened: {reason}")]
    Broken { reason: String },

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
