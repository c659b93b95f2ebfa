//! Statistics aggregator.
//!
//! [`LedgerStats`] is updated incrementally as each block is folded into the
//! record index, under the same write lock, so reads are O(1) plus a clone.
//! [`LedgerStats::recompute`] derives the same numbers from scratch.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tlg_index::{AppliedChange, LedgerSnapshot, RecordIndex};
use tlg_store::ChainStore;
use tlg_types::{Block, Digest, LogId, LogType, Transaction, TxId, TxType, GENESIS_HASH};

use crate::error::LedgerResult;

/// Bucket for records whose payload lacks the grouped field.
const UNKNOWN: &str = "unknown";

/// One recent transaction, as shown in `recentActivity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub tx_id: TxId,
    pub log_id: LogId,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub log_type: LogType,
    pub block_number: u64,
    pub hash: Digest,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEntry {
    fn new(tx: &Transaction, block_number: u64) -> Self {
        Self {
            tx_id: tx.tx_id,
            log_id: tx.log_id.clone(),
            tx_type: tx.tx_type,
            log_type: tx.log_type,
            block_number,
            hash: tx.payload_hash,
            timestamp: tx.timestamp,
        }
    }
}

/// Point-in-time statistics as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Number of CREATE transactions.
    pub total_logs: u64,
    pub total_transactions: u64,
    pub block_height: u64,
    /// Number of active records.
    pub ledger_size: u64,
    pub by_type: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_detector: BTreeMap<String, u64>,
    pub by_log_type: BTreeMap<String, u64>,
    /// Newest first.
    pub recent_activity: Vec<ActivityEntry>,
    pub latest_block_hash: Digest,
    pub generated_at: DateTime<Utc>,
}

/// Running aggregate over the chain and the active records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerStats {
    total_logs: u64,
    total_transactions: u64,
    block_height: u64,
    ledger_size: u64,
    latest_block_hash: Digest,
    by_type: BTreeMap<String, u64>,
    by_severity: BTreeMap<String, u64>,
    by_detector: BTreeMap<String, u64>,
    by_log_type: BTreeMap<String, u64>,
    /// Oldest at the front.
    recent: VecDeque<ActivityEntry>,
    recent_limit: usize,
}

impl LedgerStats {
    pub fn new(recent_limit: usize) -> Self {
        Self {
            total_logs: 0,
            total_transactions: 0,
            block_height: 0,
            ledger_size: 0,
            latest_block_hash: GENESIS_HASH,
            by_type: BTreeMap::new(),
            by_severity: BTreeMap::new(),
            by_detector: BTreeMap::new(),
            by_log_type: BTreeMap::new(),
            recent: VecDeque::with_capacity(recent_limit),
            recent_limit,
        }
    }

    /// Derive statistics from scratch: chain counters from `store`,
    /// groupings from the active records in `index`.
    pub fn recompute(
        store: &dyn ChainStore,
        index: &RecordIndex,
        recent_limit: usize,
    ) -> LedgerResult<Self> {
        let mut stats = Self::new(recent_limit);
        let height = store.height()?;
        for block in store.iter_blocks(1, height) {
            stats.record_block(&block?);
        }
        for snap in index.snapshots().filter(|s| s.is_active()) {
            stats.add_record(snap);
        }
        Ok(stats)
    }

    /// Fold a newly committed block and the index changes it caused.
    pub fn apply(&mut self, block: &Block, changes: &[AppliedChange]) {
        self.record_block(block);
        for change in changes {
            if let Some(prev) = change.previous.as_ref().filter(|p| p.is_active()) {
                self.remove_record(prev);
            }
            if change.current.is_active() {
                self.add_record(&change.current);
            }
        }
    }

    pub fn total_transactions(&self) -> u64 {
        self.total_transactions
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn snapshot(&self) -> Statistics {
        Statistics {
            total_logs: self.total_logs,
            total_transactions: self.total_transactions,
            block_height: self.block_height,
            ledger_size: self.ledger_size,
            by_type: self.by_type.clone(),
            by_severity: self.by_severity.clone(),
            by_detector: self.by_detector.clone(),
            by_log_type: self.by_log_type.clone(),
            recent_activity: self.recent.iter().rev().cloned().collect(),
            latest_block_hash: self.latest_block_hash,
            generated_at: Utc::now(),
        }
    }

    fn record_block(&mut self, block: &Block) {
        self.block_height = block.block_number;
        self.latest_block_hash = block.block_hash;
        for tx in &block.transactions {
            self.total_transactions += 1;
            if tx.tx_type == TxType::Create {
                self.total_logs += 1;
            }
            if self.recent.len() == self.recent_limit {
                self.recent.pop_front();
            }
            if self.recent_limit > 0 {
                self.recent.push_back(ActivityEntry::new(tx, block.block_number));
            }
        }
    }

    fn add_record(&mut self, snap: &LedgerSnapshot) {
        self.ledger_size += 1;
        for (map, key) in self.groupings(snap) {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    fn remove_record(&mut self, snap: &LedgerSnapshot) {
        self.ledger_size = self.ledger_size.saturating_sub(1);
        for (map, key) in self.groupings(snap) {
            if let Some(count) = map.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    map.remove(&key);
                }
            }
        }
    }

    fn groupings<'a>(
        &'a mut self,
        snap: &LedgerSnapshot,
    ) -> [(&'a mut BTreeMap<String, u64>, String); 4] {
        let threat_type = snap.payload_str("type").unwrap_or(UNKNOWN).to_string();
        let severity = snap
            .payload_str("severity")
            .map_or_else(|| UNKNOWN.to_string(), str::to_ascii_lowercase);
        [
            (&mut self.by_type, threat_type),
            (&mut self.by_severity, severity),
            (&mut self.by_detector, snap.detection_method.clone()),
            (&mut self.by_log_type, snap.log_type.as_str().to_string()),
        ]
    }
}
