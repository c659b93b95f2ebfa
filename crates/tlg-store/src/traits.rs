use chrono::Utc;
use tlg_crypto::{block_hash, ChainError, ChainVerifier};
use tlg_types::{Block, Digest, Transaction, GENESIS_HASH};

use crate::error::{StoreError, StoreResult};

/// Append-only, hash-linked block store.
///
/// All implementations must satisfy these invariants:
/// - `append` assigns `blockNumber = height + 1` and links the new block to
///   the current head (or [`GENESIS_HASH`] when empty).
/// - `append` is atomic: either the block is durable and visible, or the
///   store is exactly as it was before the call.
/// - Committed blocks are never modified or removed.
/// - Concurrent reads are always safe.
pub trait ChainStore: Send + Sync {
    /// Seal `transactions` into the next block and persist it.
    fn append(&self, transactions: Vec<Transaction>) -> StoreResult<Block>;

    /// Read block `n` (1-based). `Ok(None)` if it does not exist.
    fn get_block(&self, n: u64) -> StoreResult<Option<Block>>;

    /// The most recently appended block.
    fn latest_block(&self) -> StoreResult<Option<Block>>;

    /// Number of blocks in the chain.
    fn height(&self) -> StoreResult<u64>;

    /// Total transactions across all blocks.
    fn tx_count(&self) -> StoreResult<u64>;

    /// Lazy iterator over blocks `from..=to`, clamped to the chain height.
    fn iter_blocks(&self, from: u64, to: u64) -> BlockIter<'_>;

    /// Walk the chain from genesis, recomputing every hash and link.
    ///
    /// Returns the first divergence in the report; never repairs anything.
    fn verify_chain_integrity(&self) -> StoreResult<IntegrityReport> {
        let height = self.height()?;
        let mut verifier = ChainVerifier::new();
        for block in self.iter_blocks(1, height) {
            let block = block?;
            if let Err(divergence) = verifier.check(&block) {
                return Ok(IntegrityReport {
                    blocks_checked: verifier.checked(),
                    head_hash: verifier.head_hash(),
                    divergence: Some(divergence),
                });
            }
        }
        Ok(IntegrityReport {
            blocks_checked: verifier.checked(),
            head_hash: verifier.head_hash(),
            divergence: None,
        })
    }
}

/// Outcome of a full chain walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Blocks that passed every check before the walk stopped.
    pub blocks_checked: u64,
    /// Hash of the last block that passed.
    pub head_hash: Digest,
    /// First divergence found, if any.
    pub divergence: Option<ChainError>,
}

impl IntegrityReport {
    pub fn is_intact(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Lazy, finite, restartable walk over a range of blocks.
///
/// Each step reads one block from the store, so the iterator holds no block
/// data of its own. Iteration ends at `to` or at the first missing block.
pub struct BlockIter<'a> {
    store: &'a dyn ChainStore,
    from: u64,
    to: u64,
    next: u64,
    done: bool,
}

impl<'a> BlockIter<'a> {
    pub fn new(store: &'a dyn ChainStore, from: u64, to: u64) -> Self {
        let from = from.max(1);
        Self {
            store,
            from,
            to,
            next: from,
            done: false,
        }
    }

    /// Rewind to the first block of the range.
    pub fn restart(&mut self) {
        self.next = self.from;
        self.done = false;
    }
}

impl Iterator for BlockIter<'_> {
    type Item = StoreResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next > self.to {
            return None;
        }
        match self.store.get_block(self.next) {
            Ok(Some(block)) => {
                self.next += 1;
                Some(Ok(block))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Build the block that follows `head` from a batch of transactions.
///
/// Shared by every backend so block numbering and hashing are identical
/// regardless of where the chain lives.
pub fn seal_block(head: Option<&Block>, transactions: Vec<Transaction>) -> StoreResult<Block> {
    if transactions.is_empty() {
        return Err(StoreError::EmptyBatch);
    }

    let mut last = head.and_then(Block::last_tx_id);
    for tx in &transactions {
        if last.is_some_and(|l| tx.tx_id <= l) {
            return Err(StoreError::TxOutOfOrder {
                tx_id: tx.tx_id,
                last,
            });
        }
        last = Some(tx.tx_id);
    }

    let block_number = head.map_or(1, |b| b.block_number + 1);
    let previous_block_hash = head.map_or(GENESIS_HASH, |b| b.block_hash);
    let block_hash = block_hash(block_number, &previous_block_hash, &transactions)?;

    Ok(Block {
        block_number,
        previous_block_hash,
        block_hash,
        committed_at: Utc::now(),
        transactions,
    })
}
