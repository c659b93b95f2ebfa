//! The in-memory record index.
//!
//! [`RecordIndex`] is fed blocks in chain order and keeps, per `logId`, the
//! latest [`LedgerSnapshot`] plus the full ordered history. Active records
//! are additionally ordered by the transaction that created them, which is
//! what list pagination walks.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tlg_store::ChainStore;
use tlg_types::{Block, Digest, LogId, Transaction, TxId, TxType, GENESIS_HASH};
use tracing::info;

use crate::error::{IndexError, IndexResult};
use crate::snapshot::{LedgerSnapshot, RecordStatus, TxRef};

/// Format version written into checkpoints.
pub(crate) const INDEX_VERSION: u32 = 1;

/// Ordering of list results by record creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    #[default]
    Newest,
    Oldest,
}

impl FromStr for ListOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "desc" => Ok(Self::Newest),
            "oldest" | "asc" => Ok(Self::Oldest),
            other => Err(format!("unknown order '{other}' (expected newest or oldest)")),
        }
    }
}

/// Result of applying one transaction: the snapshot before and after.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedChange {
    pub previous: Option<LedgerSnapshot>,
    pub current: LedgerSnapshot,
}

/// Derived per-record view of the chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIndex {
    pub(crate) version: u32,
    /// Last block folded into the index.
    pub(crate) applied_height: u64,
    /// Hash of block `applied_height`, or genesis.
    pub(crate) head_hash: Digest,
    pub(crate) snapshots: HashMap<LogId, LedgerSnapshot>,
    pub(crate) history: HashMap<LogId, Vec<TxRef>>,
    /// Active records keyed by their CREATE transaction.
    #[serde(skip)]
    active: BTreeMap<TxId, LogId>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            applied_height: 0,
            head_hash: GENESIS_HASH,
            snapshots: HashMap::new(),
            history: HashMap::new(),
            active: BTreeMap::new(),
        }
    }

    /// Replay the whole chain from genesis into a fresh index.
    pub fn rebuild(store: &dyn ChainStore) -> IndexResult<Self> {
        let mut index = Self::new();
        let height = store.height()?;
        for block in store.iter_blocks(1, height) {
            index.apply_block(&block?)?;
        }
        info!(
            height = index.applied_height,
            records = index.snapshots.len(),
            active = index.active.len(),
            "record index rebuilt from chain"
        );
        Ok(index)
    }

    pub fn applied_height(&self) -> u64 {
        self.applied_height
    }

    pub fn head_hash(&self) -> Digest {
        self.head_hash
    }

    /// Number of records ever created, deleted ones included.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn get_snapshot(&self, log_id: &LogId) -> Option<&LedgerSnapshot> {
        self.snapshots.get(log_id)
    }

    /// Ordered history of a record, oldest first.
    pub fn get_history(&self, log_id: &LogId) -> Option<&[TxRef]> {
        self.history.get(log_id).map(Vec::as_slice)
    }

    /// Every snapshot, active or not, in no particular order.
    pub fn snapshots(&self) -> impl Iterator<Item = &LedgerSnapshot> {
        self.snapshots.values()
    }

    /// Active records in creation order.
    pub fn active(&self, order: ListOrder) -> Box<dyn Iterator<Item = &LedgerSnapshot> + '_> {
        let ids = self.active.values();
        let snapshots = &self.snapshots;
        match order {
            ListOrder::Oldest => Box::new(ids.filter_map(move |id| snapshots.get(id))),
            ListOrder::Newest => Box::new(ids.rev().filter_map(move |id| snapshots.get(id))),
        }
    }

    /// One page of active records.
    pub fn list_active(&self, limit: usize, offset: usize, order: ListOrder) -> Vec<&LedgerSnapshot> {
        self.active(order).skip(offset).take(limit).collect()
    }

    /// Fold the next block of the chain into the index.
    ///
    /// Every transaction is checked before anything is mutated, so a block
    /// that fails leaves the index untouched.
    pub fn apply_block(&mut self, block: &Block) -> IndexResult<Vec<AppliedChange>> {
        let expected = self.applied_height + 1;
        if block.block_number != expected {
            return Err(IndexError::OutOfSequence {
                expected,
                found: block.block_number,
            });
        }

        let mut seen: HashMap<&LogId, RecordStatus> = HashMap::new();
        for tx in &block.transactions {
            let status = seen
                .get(&tx.log_id)
                .copied()
                .or_else(|| self.snapshots.get(&tx.log_id).map(|s| s.status));
            check_lifecycle(tx, status)?;
            decode_payload(tx)?;
            let next = match tx.tx_type {
                TxType::Delete => RecordStatus::Deleted,
                TxType::Create | TxType::Update => RecordStatus::Active,
            };
            seen.insert(&tx.log_id, next);
        }

        let mut changes = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            changes.push(self.apply_transaction(tx, block.block_number)?);
        }
        self.applied_height = block.block_number;
        self.head_hash = block.block_hash;
        Ok(changes)
    }

    /// Apply a single transaction that lives in block `block_number`.
    ///
    /// CREATE inserts a snapshot; UPDATE replaces its payload and hash;
    /// DELETE marks it deleted and keeps the last payload for audit.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        block_number: u64,
    ) -> IndexResult<AppliedChange> {
        let previous = self.snapshots.get(&tx.log_id).cloned();
        check_lifecycle(tx, previous.as_ref().map(|s| s.status))?;

        let current = match (tx.tx_type, previous.clone()) {
            (TxType::Create, _) => LedgerSnapshot {
                log_id: tx.log_id.clone(),
                log_type: tx.log_type,
                detection_method: tx.detection_method.clone(),
                latest_payload: decode_payload(tx)?,
                latest_hash: tx.payload_hash,
                latest_tx_id: tx.tx_id,
                created_tx_id: tx.tx_id,
                block_number,
                status: RecordStatus::Active,
                created_at: tx.timestamp,
                updated_at: tx.timestamp,
            },
            (tx_type, Some(mut snap)) => {
                if tx_type == TxType::Update {
                    snap.latest_payload = decode_payload(tx)?;
                    snap.latest_hash = tx.payload_hash;
                    snap.detection_method = tx.detection_method.clone();
                } else {
                    snap.status = RecordStatus::Deleted;
                }
                snap.latest_tx_id = tx.tx_id;
                snap.block_number = block_number;
                snap.updated_at = tx.timestamp;
                snap
            }
            (_, None) => {
                return Err(IndexError::Lifecycle {
                    log_id: tx.log_id.clone(),
                    tx_id: tx.tx_id,
                    reason: "record was never created",
                })
            }
        };

        match tx.tx_type {
            TxType::Create => {
                self.active.insert(tx.tx_id, tx.log_id.clone());
            }
            TxType::Delete => {
                self.active.remove(&current.created_tx_id);
            }
            TxType::Update => {}
        }
        self.history
            .entry(tx.log_id.clone())
            .or_default()
            .push(TxRef::new(tx, block_number));
        self.snapshots.insert(tx.log_id.clone(), current.clone());

        Ok(AppliedChange { previous, current })
    }

    /// Recompute the active ordering after deserialization.
    pub(crate) fn reindex_active(&mut self) {
        self.active = self
            .snapshots
            .values()
            .filter(|s| s.is_active())
            .map(|s| (s.created_tx_id, s.log_id.clone()))
            .collect();
    }
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn check_lifecycle(tx: &Transaction, status: Option<RecordStatus>) -> IndexResult<()> {
    let reason = match (tx.tx_type, status) {
        (TxType::Create, None) => return Ok(()),
        (TxType::Update | TxType::Delete, Some(RecordStatus::Active)) => return Ok(()),
        (TxType::Create, Some(_)) => "record already exists",
        (_, None) => "record was never created",
        (_, Some(RecordStatus::Deleted)) => "record is deleted",
    };
    Err(IndexError::Lifecycle {
        log_id: tx.log_id.clone(),
        tx_id: tx.tx_id,
        reason,
    })
}

fn decode_payload(tx: &Transaction) -> IndexResult<serde_json::Value> {
    tx.payload_value().map_err(|e| IndexError::Payload {
        tx_id: tx.tx_id,
        reason: e.to_string(),
    })
}
