use thiserror::Error;

/// Errors produced by type parsing and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid log id: {0}")]
    InvalidLogId(String),

    #[error("unknown log type: {0}")]
    UnknownLogType(String),

    #[error("unknown transaction type: {0}")]
    UnknownTxType(String),
}
