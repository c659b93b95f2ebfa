use tlg_crypto::{CanonicalError, ChainError};
use tlg_index::IndexError;
use tlg_store::StoreError;
use tlg_types::{LogId, TypeError};

/// Errors produced by ledger operations.
///
/// Everything except [`LedgerError::StoreUnavailable`] and
/// [`LedgerError::ChainIntegrity`] is a caller error, rejected before any
/// state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("log id {0} already exists")]
    DuplicateLogId(LogId),

    #[error("log id {0} not found")]
    NotFound(String),

    #[error("log id {0} has been deleted")]
    AlreadyDeleted(LogId),

    #[error("payload cannot be encoded: {0}")]
    Encoding(#[from] CanonicalError),

    #[error("chain store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("chain integrity violated: {0}")]
    ChainIntegrity(#[from] ChainError),
}

impl LedgerError {
    /// Whether the identical request may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateLogId(_) => "DUPLICATE_LOG_ID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyDeleted(_) => "ALREADY_DELETED",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::ChainIntegrity(_) => "CHAIN_INTEGRITY_ERROR",
        }
    }
}

impl From<TypeError> for LedgerError {
    fn from(e: TypeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Encoding(inner) => Self::Encoding(inner),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<IndexError> for LedgerError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Store(inner) => inner.into(),
            other => Self::StoreUnavailable(format!("record index: {other}")),
        }
    }
}

/// Convenience alias for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn only_store_failures_are_retryable() {
        let timeout: LedgerError = StoreError::Timeout {
            limit: Duration::from_millis(10),
        }
        .into();
        assert!(timeout.is_retryable());
        assert_eq!(timeout.code(), "STORE_UNAVAILABLE");

        assert!(!LedgerError::Validation("x".into()).is_retryable());
        assert!(!LedgerError::NotFound("T1".into()).is_retryable());
        assert!(!LedgerError::ChainIntegrity(ChainError::BrokenLink { block_number: 2 }).is_retryable());
    }

    #[test]
    fn store_encoding_failures_stay_encoding_errors() {
        let err: LedgerError = StoreError::Encoding(CanonicalError::TooDeep { max: 128 }).into();
        assert_eq!(err.code(), "ENCODING_ERROR");
    }
}
