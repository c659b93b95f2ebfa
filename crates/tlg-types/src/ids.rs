use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest accepted [`LogId`], in bytes.
pub const MAX_LOG_ID_LEN: usize = 256;

/// Caller-supplied identifier of a threat record.
///
/// The detection pipeline owns id generation; the ledger only checks that the
/// id is non-empty, bounded, and free of control characters. Once a record is
/// created under a `LogId` that id never changes. Deserialization runs the
/// same checks as [`LogId::new`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogId(String);

impl LogId {
    /// Validate and wrap a raw id.
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TypeError::InvalidLogId("log id must not be empty".into()));
        }
        if raw.len() > MAX_LOG_ID_LEN {
            return Err(TypeError::InvalidLogId(format!(
                "log id exceeds {MAX_LOG_ID_LEN} bytes"
            )));
        }
        if raw.chars().any(char::is_control) {
            return Err(TypeError::InvalidLogId(
                "log id must not contain control characters".into(),
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({})", self.0)
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LogId {
    type Error = TypeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<LogId> for String {
    fn from(id: LogId) -> Self {
        id.0
    }
}

impl AsRef<str> for LogId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Globally unique, monotonic transaction number (1-based).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(u64);

impl TxId {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_ids() {
        let id = LogId::new("THREAT001").unwrap();
        assert_eq!(id.as_str(), "THREAT001");
        assert_eq!(format!("{id}"), "THREAT001");
    }

    #[test]
    fn rejects_blank_ids() {
        assert!(LogId::new("").is_err());
        assert!(LogId::new("   ").is_err());
    }

    #[test]
    fn rejects_control_characters() {
        assert!(LogId::new("abc\ndef").is_err());
    }

    #[test]
    fn rejects_oversized_ids() {
        let long = "x".repeat(MAX_LOG_ID_LEN + 1);
        assert!(LogId::new(long).is_err());
        assert!(LogId::new("x".repeat(MAX_LOG_ID_LEN)).is_ok());
    }

    #[test]
    fn log_id_serializes_as_plain_string() {
        let id = LogId::new("T1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"T1\"");
    }

    #[test]
    fn deserializing_checks_log_ids() {
        let id: LogId = serde_json::from_str("\"T1\"").unwrap();
        assert_eq!(id.as_str(), "T1");
        assert!(serde_json::from_str::<LogId>("\"\"").is_err());
        assert!(serde_json::from_str::<LogId>("\"   \"").is_err());
        assert!(serde_json::from_str::<LogId>("\"T\\u0007\"").is_err());
        let oversized = format!("\"{}\"", "x".repeat(MAX_LOG_ID_LEN + 1));
        assert!(serde_json::from_str::<LogId>(&oversized).is_err());
    }

    #[test]
    fn tx_id_ordering_and_next() {
        let a = TxId::new(1);
        assert!(a < a.next());
        assert_eq!(a.next().get(), 2);
        assert_eq!(format!("{}", TxId::new(42)), "tx#42");
    }
}
