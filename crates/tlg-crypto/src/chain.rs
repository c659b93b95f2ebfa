use serde_json::json;
use tlg_types::{Block, Digest, Transaction, TxId, GENESIS_HASH};

use crate::canonical::CanonicalError;
use crate::hasher::ContentHasher;

/// Compute the hash of a block from its linking fields and transactions.
///
/// The hash covers `{blockNumber, previousBlockHash, transactions}` where
/// each transaction contributes its summary (`txId`, `logId`, `type`,
/// `payloadHash`, `timestamp`). `committedAt` is not covered.
pub fn block_hash(
    block_number: u64,
    previous_block_hash: &Digest,
    transactions: &[Transaction],
) -> Result<Digest, CanonicalError> {
    let summaries: Vec<_> = transactions.iter().map(Transaction::summary).collect();
    let summaries = serde_json::to_value(&summaries)
        .map_err(|e| CanonicalError::Serialization(e.to_string()))?;
    ContentHasher::hash_value(&json!({
        "blockNumber": block_number,
        "previousBlockHash": previous_block_hash.to_hex(),
        "transactions": summaries,
    }))
}

/// Errors from chain verification. Each names the first block that diverges.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block sequence gap: expected block {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("broken link at block {block_number}: previous hash does not match its predecessor")]
    BrokenLink { block_number: u64 },

    #[error("block {block_number} does not link to the genesis hash")]
    GenesisMismatch { block_number: u64 },

    #[error("hash mismatch at block {block_number}: computed hash differs from stored")]
    HashMismatch { block_number: u64 },

    #[error("block {block_number} holds no transactions")]
    EmptyBlock { block_number: u64 },

    #[error("payload of {tx_id} in block {block_number} does not match its recorded hash")]
    PayloadMismatch { block_number: u64, tx_id: TxId },

    #[error("transaction {tx_id} in block {block_number} is out of order")]
    TxOutOfOrder { block_number: u64, tx_id: TxId },

    #[error("block {block_number} could not be encoded: {source}")]
    Encoding {
        block_number: u64,
        source: CanonicalError,
    },
}

impl ChainError {
    /// Number of the block at which the chain diverges.
    pub fn block_number(&self) -> u64 {
        match self {
            Self::SequenceGap { found, .. } => *found,
            Self::BrokenLink { block_number }
            | Self::GenesisMismatch { block_number }
            | Self::HashMismatch { block_number }
            | Self::EmptyBlock { block_number }
            | Self::PayloadMismatch { block_number, .. }
            | Self::TxOutOfOrder { block_number, .. }
            | Self::Encoding { block_number, .. } => *block_number,
        }
    }
}

/// Incremental hash-chain verifier.
///
/// Feed blocks in order starting from block 1. For each block it checks:
/// 1. the block number is exactly one past the previous block
/// 2. `previousBlockHash` equals the previous block's hash (genesis constant for block 1)
/// 3. the stored block hash matches a recomputation
/// 4. transaction ids strictly increase across the chain
/// 5. every stored payload hashes to its recorded `payloadHash`
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    next_number: u64,
    prev_hash: Digest,
    last_tx: Option<TxId>,
}

impl ChainVerifier {
    pub fn new() -> Self {
        Self {
            next_number: 1,
            prev_hash: GENESIS_HASH,
            last_tx: None,
        }
    }

    /// Number of blocks accepted so far.
    pub fn checked(&self) -> u64 {
        self.next_number - 1
    }

    /// Hash of the last accepted block, or genesis.
    pub fn head_hash(&self) -> Digest {
        self.prev_hash
    }

    /// Check the next block in sequence.
    pub fn check(&mut self, block: &Block) -> Result<(), ChainError> {
        let n = block.block_number;
        if n != self.next_number {
            return Err(ChainError::SequenceGap {
                expected: self.next_number,
                found: n,
            });
        }

        if block.previous_block_hash != self.prev_hash {
            return Err(if n == 1 {
                ChainError::GenesisMismatch { block_number: n }
            } else {
                ChainError::BrokenLink { block_number: n }
            });
        }

        if block.transactions.is_empty() {
            return Err(ChainError::EmptyBlock { block_number: n });
        }

        let computed = block_hash(n, &block.previous_block_hash, &block.transactions)
            .map_err(|source| ChainError::Encoding {
                block_number: n,
                source,
            })?;
        if computed != block.block_hash {
            return Err(ChainError::HashMismatch { block_number: n });
        }

        for tx in &block.transactions {
            if self.last_tx.is_some_and(|last| tx.tx_id <= last) {
                return Err(ChainError::TxOutOfOrder {
                    block_number: n,
                    tx_id: tx.tx_id,
                });
            }
            if !ContentHasher::verify(tx.payload.as_bytes(), &tx.payload_hash) {
                return Err(ChainError::PayloadMismatch {
                    block_number: n,
                    tx_id: tx.tx_id,
                });
            }
            self.last_tx = Some(tx.tx_id);
        }

        self.prev_hash = block.block_hash;
        self.next_number += 1;
        Ok(())
    }

    /// Verify a complete chain from genesis.
    pub fn verify_chain<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Result<u64, ChainError> {
        let mut verifier = Self::new();
        for block in blocks {
            verifier.check(block)?;
        }
        Ok(verifier.checked())
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use serde_json::json;
    use tlg_types::{LogId, LogType, TxType};

    use super::*;
    use crate::canonical::canonical_string;

    fn tx(n: u64, payload: serde_json::Value) -> Transaction {
        let payload = canonical_string(&payload).unwrap();
        Transaction {
            tx_id: TxId::new(n),
            log_id: LogId::new(format!("T{n}")).unwrap(),
            tx_type: TxType::Create,
            log_type: LogType::NetworkThreat,
            detection_method: "network_ai_service".into(),
            payload_hash: ContentHasher::hash(payload.as_bytes()),
            payload,
            timestamp: DateTime::from_timestamp(1_700_000_000 + n as i64, 0).unwrap(),
        }
    }

    fn build_chain(count: u64) -> Vec<Block> {
        let mut chain = Vec::new();
        let mut prev = GENESIS_HASH;
        for n in 1..=count {
            let txs = vec![tx(n, json!({"severity": "high", "n": n}))];
            let hash = block_hash(n, &prev, &txs).unwrap();
            chain.push(Block {
                block_number: n,
                previous_block_hash: prev,
                block_hash: hash,
                committed_at: txs[0].timestamp,
                transactions: txs,
            });
            prev = hash;
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        assert_eq!(ChainVerifier::verify_chain(&Vec::<Block>::new()).unwrap(), 0);
    }

    #[test]
    fn well_formed_chain_verifies() {
        let chain = build_chain(10);
        assert_eq!(ChainVerifier::verify_chain(&chain).unwrap(), 10);
    }

    #[test]
    fn block_hash_depends_on_previous_hash() {
        let txs = vec![tx(1, json!({}))];
        let a = block_hash(1, &GENESIS_HASH, &txs).unwrap();
        let b = block_hash(1, &Digest::from_hash([1; 32]), &txs).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn first_block_must_link_to_genesis() {
        let mut chain = build_chain(1);
        chain[0].previous_block_hash = Digest::from_hash([5; 32]);
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::GenesisMismatch { block_number: 1 }
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].previous_block_hash = Digest::from_hash([99; 32]);
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { block_number: 3 }
        );
    }

    #[test]
    fn sequence_gap_detected() {
        let mut chain = build_chain(3);
        chain.remove(1);
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::SequenceGap {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn rewritten_summary_detected() {
        let mut chain = build_chain(3);
        chain[1].transactions[0].tx_type = TxType::Delete;
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::HashMismatch { block_number: 2 }
        );
    }

    #[test]
    fn tampered_payload_detected() {
        let mut chain = build_chain(3);
        chain[1].transactions[0].payload = r#"{"severity":"low"}"#.into();
        let err = ChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(
            err,
            ChainError::PayloadMismatch {
                block_number: 2,
                tx_id: TxId::new(2)
            }
        );
        assert_eq!(err.block_number(), 2);
    }

    #[test]
    fn empty_block_detected() {
        let mut chain = build_chain(1);
        chain[0].transactions.clear();
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::EmptyBlock { block_number: 1 }
        );
    }

    #[test]
    fn verifier_tracks_head() {
        let chain = build_chain(2);
        let mut v = ChainVerifier::new();
        assert!(v.head_hash().is_genesis());
        v.check(&chain[0]).unwrap();
        v.check(&chain[1]).unwrap();
        assert_eq!(v.head_hash(), chain[1].block_hash);
        assert_eq!(v.checked(), 2);
    }
}
