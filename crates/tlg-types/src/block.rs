use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::ids::{LogId, TxId};
use crate::kind::{LogType, TxType};

/// One committed change to a single threat record.
///
/// The payload body is kept beside the transaction in its canonical JSON
/// form, so `payload_hash` can always be recomputed over the complete
/// payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub tx_id: TxId,
    pub log_id: LogId,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub log_type: LogType,
    pub detection_method: String,
    /// SHA-256 of `payload` at commit time.
    pub payload_hash: Digest,
    /// Canonical JSON encoding of the payload.
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Decode the stored canonical payload back into a structured value.
    pub fn payload_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }

    /// The fields of this transaction that participate in the block hash.
    pub fn summary(&self) -> TxSummary {
        TxSummary {
            tx_id: self.tx_id,
            log_id: self.log_id.clone(),
            tx_type: self.tx_type,
            payload_hash: self.payload_hash,
            timestamp: self.timestamp,
        }
    }
}

/// Hash-relevant projection of a [`Transaction`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSummary {
    pub tx_id: TxId,
    pub log_id: LogId,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub payload_hash: Digest,
    pub timestamp: DateTime<Utc>,
}

/// A persisted, immutable batch of transactions linked to its predecessor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// 1-based, strictly increasing.
    pub block_number: u64,
    /// Hash of block `n - 1`, or [`crate::GENESIS_HASH`] for block 1.
    pub previous_block_hash: Digest,
    /// Hash over `{blockNumber, previousBlockHash, transactions}`.
    pub block_hash: Digest,
    pub committed_at: DateTime<Utc>,
    /// Never empty.
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn summaries(&self) -> Vec<TxSummary> {
        self.transactions.iter().map(Transaction::summary).collect()
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Highest transaction id in this block.
    pub fn last_tx_id(&self) -> Option<TxId> {
        self.transactions.last().map(|tx| tx.tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::GENESIS_HASH;

    fn tx(n: u64) -> Transaction {
        Transaction {
            tx_id: TxId::new(n),
            log_id: LogId::new(format!("T{n}")).unwrap(),
            tx_type: TxType::Create,
            log_type: LogType::NetworkThreat,
            detection_method: "network_ai_service".into(),
            payload_hash: Digest::from_hash([n as u8; 32]),
            payload: r#"{"severity":"high"}"#.into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn summary_carries_hash_relevant_fields() {
        let t = tx(3);
        let s = t.summary();
        assert_eq!(s.tx_id, t.tx_id);
        assert_eq!(s.log_id, t.log_id);
        assert_eq!(s.payload_hash, t.payload_hash);

        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["type"], "CREATE");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn payload_value_decodes_canonical_text() {
        let t = tx(1);
        assert_eq!(t.payload_value().unwrap()["severity"], "high");
    }

    #[test]
    fn block_survives_bincode() {
        let block = Block {
            block_number: 1,
            previous_block_hash: GENESIS_HASH,
            block_hash: Digest::from_hash([9; 32]),
            committed_at: DateTime::from_timestamp(1_700_000_001, 500).unwrap(),
            transactions: vec![tx(1), tx(2)],
        };
        let bytes = bincode::serialize(&block).unwrap();
        let back: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.tx_count(), 2);
        assert_eq!(back.last_tx_id(), Some(TxId::new(2)));
    }
}
