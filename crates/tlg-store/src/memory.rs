use std::sync::RwLock;

use tlg_types::{Block, Transaction};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{seal_block, BlockIter, ChainStore};

/// In-memory, `Vec`-backed chain store.
///
/// Intended for tests and embedding. Blocks live behind a `RwLock`; reads
/// clone out of it.
pub struct InMemoryChainStore {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    blocks: Vec<Block>,
    tx_count: u64,
}

impl InMemoryChainStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState::default()),
        }
    }

    /// Load a pre-existing sequence of blocks as-is.
    ///
    /// Nothing is validated here; run
    /// [`ChainStore::verify_chain_integrity`] to check what was loaded.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let tx_count = blocks.iter().map(|b| b.tx_count() as u64).sum();
        Self {
            inner: RwLock::new(MemoryState { blocks, tx_count }),
        }
    }

    /// Copy of every block, in order.
    pub fn blocks(&self) -> StoreResult<Vec<Block>> {
        Ok(self.read()?.blocks.clone())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore for InMemoryChainStore {
    fn append(&self, transactions: Vec<Transaction>) -> StoreResult<Block> {
        let mut state = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let block = seal_block(state.blocks.last(), transactions)?;
        state.tx_count += block.tx_count() as u64;
        state.blocks.push(block.clone());
        debug!(block = block.block_number, hash = %block.block_hash.short_hex(), "block appended");
        Ok(block)
    }

    fn get_block(&self, n: u64) -> StoreResult<Option<Block>> {
        if n == 0 {
            return Ok(None);
        }
        Ok(self.read()?.blocks.get((n - 1) as usize).cloned())
    }

    fn latest_block(&self) -> StoreResult<Option<Block>> {
        Ok(self.read()?.blocks.last().cloned())
    }

    fn height(&self) -> StoreResult<u64> {
        Ok(self.read()?.blocks.len() as u64)
    }

    fn tx_count(&self) -> StoreResult<u64> {
        Ok(self.read()?.tx_count)
    }

    fn iter_blocks(&self, from: u64, to: u64) -> BlockIter<'_> {
        BlockIter::new(self, from, to)
    }
}

impl std::fmt::Debug for InMemoryChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let height = self.height().unwrap_or_default();
        f.debug_struct("InMemoryChainStore")
            .field("height", &height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tlg_crypto::{canonical_string, ChainError, ContentHasher};
    use tlg_types::{Digest, LogId, LogType, TxId, TxType, GENESIS_HASH};

    use super::*;

    fn tx(n: u64) -> Transaction {
        let payload = canonical_string(&serde_json::json!({"severity": "high", "n": n})).unwrap();
        Transaction {
            tx_id: TxId::new(n),
            log_id: LogId::new(format!("T{n}")).unwrap(),
            tx_type: TxType::Create,
            log_type: LogType::SecurityEvent,
            detection_method: "rule_engine".into(),
            payload_hash: ContentHasher::hash(payload.as_bytes()),
            payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn first_block_links_to_genesis() {
        let store = InMemoryChainStore::new();
        let block = store.append(vec![tx(1)]).unwrap();
        assert_eq!(block.block_number, 1);
        assert_eq!(block.previous_block_hash, GENESIS_HASH);
    }

    #[test]
    fn blocks_chain_and_count() {
        let store = InMemoryChainStore::new();
        let b1 = store.append(vec![tx(1)]).unwrap();
        let b2 = store.append(vec![tx(2), tx(3)]).unwrap();

        assert_eq!(b2.block_number, 2);
        assert_eq!(b2.previous_block_hash, b1.block_hash);
        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(store.tx_count().unwrap(), 3);
        assert_eq!(store.latest_block().unwrap().unwrap(), b2);
        assert!(store.verify_chain_integrity().unwrap().is_intact());
    }

    #[test]
    fn empty_batch_is_rejected() {
        let store = InMemoryChainStore::new();
        assert!(matches!(store.append(vec![]), Err(StoreError::EmptyBatch)));
        assert_eq!(store.height().unwrap(), 0);
    }

    #[test]
    fn stale_tx_ids_are_rejected_without_side_effects() {
        let store = InMemoryChainStore::new();
        store.append(vec![tx(1), tx(2)]).unwrap();
        let err = store.append(vec![tx(2)]).unwrap_err();
        assert!(matches!(err, StoreError::TxOutOfOrder { .. }));
        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(store.tx_count().unwrap(), 2);
    }

    #[test]
    fn get_block_out_of_range() {
        let store = InMemoryChainStore::new();
        store.append(vec![tx(1)]).unwrap();
        assert!(store.get_block(0).unwrap().is_none());
        assert!(store.get_block(2).unwrap().is_none());
        assert!(store.get_block(1).unwrap().is_some());
    }

    #[test]
    fn iterator_is_lazy_finite_and_restartable() {
        let store = InMemoryChainStore::new();
        for n in 1..=5 {
            store.append(vec![tx(n)]).unwrap();
        }

        let mut iter = store.iter_blocks(2, 4);
        let first: Vec<u64> = iter.by_ref().map(|b| b.unwrap().block_number).collect();
        assert_eq!(first, vec![2, 3, 4]);
        assert!(iter.next().is_none());

        iter.restart();
        let again: Vec<u64> = iter.map(|b| b.unwrap().block_number).collect();
        assert_eq!(again, first);

        let clamped: Vec<u64> = store
            .iter_blocks(4, 100)
            .map(|b| b.unwrap().block_number)
            .collect();
        assert_eq!(clamped, vec![4, 5]);
        assert_eq!(store.iter_blocks(3, 2).count(), 0);
    }

    #[test]
    fn integrity_walk_reports_first_divergence() {
        let store = InMemoryChainStore::new();
        for n in 1..=4 {
            store.append(vec![tx(n)]).unwrap();
        }
        let mut blocks = store.blocks().unwrap();
        blocks[2].previous_block_hash = Digest::from_hash([0xEE; 32]);

        let tampered = InMemoryChainStore::from_blocks(blocks);
        let report = tampered.verify_chain_integrity().unwrap();
        assert!(!report.is_intact());
        assert_eq!(report.blocks_checked, 2);
        assert_eq!(
            report.divergence,
            Some(ChainError::BrokenLink { block_number: 3 })
        );
    }

    #[test]
    fn empty_store_is_intact() {
        let report = InMemoryChainStore::new().verify_chain_integrity().unwrap();
        assert!(report.is_intact());
        assert_eq!(report.blocks_checked, 0);
        assert!(report.head_hash.is_genesis());
    }
}
