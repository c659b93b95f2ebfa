use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of change a transaction applies to a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    /// First transaction of a record.
    Create,
    /// Replaces the record's latest payload.
    Update,
    /// Terminal tombstone; history is retained.
    Delete,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(TypeError::UnknownTxType(s.to_string())),
        }
    }
}

/// Category of a threat record, as reported by the detector that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    SecurityEvent,
    NetworkThreat,
    ApplicationAttack,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityEvent => "security_event",
            Self::NetworkThreat => "network_threat",
            Self::ApplicationAttack => "application_attack",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "security_event" => Ok(Self::SecurityEvent),
            "network_threat" => Ok(Self::NetworkThreat),
            "application_attack" => Ok(Self::ApplicationAttack),
            _ => Err(TypeError::UnknownLogType(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_type_wire_names() {
        assert_eq!(serde_json::to_string(&TxType::Create).unwrap(), "\"CREATE\"");
        assert_eq!("delete".parse::<TxType>().unwrap(), TxType::Delete);
        assert!("MERGE".parse::<TxType>().is_err());
    }

    #[test]
    fn log_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&LogType::NetworkThreat).unwrap(),
            "\"network_threat\""
        );
        for lt in [
            LogType::SecurityEvent,
            LogType::NetworkThreat,
            LogType::ApplicationAttack,
        ] {
            assert_eq!(lt.as_str().parse::<LogType>().unwrap(), lt);
        }
    }

    #[test]
    fn unknown_log_type_is_rejected() {
        assert_eq!(
            "malware".parse::<LogType>().unwrap_err(),
            TypeError::UnknownLogType("malware".into())
        );
    }
}
