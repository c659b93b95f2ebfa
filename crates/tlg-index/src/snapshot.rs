use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tlg_types::{Digest, LogId, LogType, Transaction, TxId, TxType};

/// Whether a record is live or has been tombstoned by a DELETE.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

/// Latest state of one threat record, reconstructed from its transactions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub log_id: LogId,
    pub log_type: LogType,
    pub detection_method: String,
    /// Payload of the latest CREATE or UPDATE. A DELETE leaves it in place.
    pub latest_payload: Value,
    /// Hash recorded alongside `latest_payload`.
    pub latest_hash: Digest,
    /// Most recent transaction of any type.
    pub latest_tx_id: TxId,
    pub created_tx_id: TxId,
    /// Block holding `latest_tx_id`.
    pub block_number: u64,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// A string field of the latest payload, if present.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.latest_payload.get(key).and_then(Value::as_str)
    }
}

/// One entry in a record's ordered history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRef {
    pub tx_id: TxId,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub block_number: u64,
    #[serde(rename = "hash")]
    pub payload_hash: Digest,
    pub timestamp: DateTime<Utc>,
}

impl TxRef {
    pub fn new(tx: &Transaction, block_number: u64) -> Self {
        Self {
            tx_id: tx.tx_id,
            tx_type: tx.tx_type,
            block_number,
            payload_hash: tx.payload_hash,
            timestamp: tx.timestamp,
        }
    }
}
