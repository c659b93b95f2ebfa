//! On-disk checkpoint of the record index.
//!
//! The checkpoint is a JSON dump of [`RecordIndex`] tagged with the chain
//! height and head hash it was taken at. It is only trusted when both tags
//! match the chain store it is loaded against and every history entry and
//! snapshot agrees with the transactions on the chain; anything else falls
//! back to a full replay.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tlg_crypto::ContentHasher;
use tlg_store::ChainStore;
use tlg_types::{LogId, TxId, TxType, GENESIS_HASH};
use tracing::{info, warn};

use crate::error::{IndexError, IndexResult};
use crate::index::{RecordIndex, INDEX_VERSION};

/// File name of the checkpoint inside the ledger data directory.
pub const CHECKPOINT_FILE: &str = "index.json";

impl RecordIndex {
    /// Write the index to `path`, replacing any previous checkpoint.
    pub fn save_checkpoint(&self, path: &Path) -> IndexResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes =
            serde_json::to_vec(self).map_err(|e| IndexError::Serialization(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        info!(
            path = %path.display(),
            height = self.applied_height,
            "record index checkpoint written"
        );
        Ok(())
    }

    /// Read a checkpoint. `Ok(None)` if the file does not exist.
    pub fn load_checkpoint(path: &Path) -> IndexResult<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut index: Self =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;
        index.reindex_active();
        Ok(Some(index))
    }

    /// Load the checkpoint at `path` if it is current for `store`, otherwise
    /// rebuild by replay.
    pub fn load_or_rebuild(path: Option<&Path>, store: &dyn ChainStore) -> IndexResult<Self> {
        let Some(path) = path else {
            return Self::rebuild(store);
        };

        let index = match Self::load_checkpoint(path) {
            Ok(Some(index)) => index,
            Ok(None) => return Self::rebuild(store),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable index checkpoint; rebuilding");
                return Self::rebuild(store);
            }
        };

        let height = store.height()?;
        let head = store
            .latest_block()?
            .map_or(GENESIS_HASH, |b| b.block_hash);
        if index.version != INDEX_VERSION || index.applied_height != height || index.head_hash != head {
            warn!(
                path = %path.display(),
                checkpoint_height = index.applied_height,
                chain_height = height,
                "stale index checkpoint; rebuilding"
            );
            return Self::rebuild(store);
        }
        if let Some(reason) = index.divergence_from(store)? {
            warn!(path = %path.display(), %reason, "index checkpoint disagrees with chain; rebuilding");
            return Self::rebuild(store);
        }

        info!(height, records = index.len(), "record index loaded from checkpoint");
        Ok(index)
    }

    /// First place where this index disagrees with the chain, if any.
    ///
    /// Every history entry must name a transaction on the chain with the
    /// same record, type, block, hash and timestamp, and every snapshot
    /// must be the fold of its history.
    fn divergence_from(&self, store: &dyn ChainStore) -> IndexResult<Option<String>> {
        if self.snapshots.len() != self.history.len() {
            return Ok(Some("snapshot and history sets differ".into()));
        }

        // Transaction whose payload a snapshot currently carries.
        let mut bearers: HashMap<&LogId, TxId> = HashMap::new();
        let mut entries = HashMap::new();
        for (log_id, history) in &self.history {
            let Some(snap) = self.snapshots.get(log_id) else {
                return Ok(Some(format!("{log_id} has history but no snapshot")));
            };
            let (Some(first), Some(last)) = (history.first(), history.last()) else {
                return Ok(Some(format!("{log_id} has an empty history")));
            };
            let Some(bearer) = history.iter().rev().find(|t| t.tx_type != TxType::Delete) else {
                return Ok(Some(format!("{log_id} has no CREATE or UPDATE")));
            };
            let deleted = last.tx_type == TxType::Delete;
            if snap.log_id != *log_id
                || first.tx_type != TxType::Create
                || snap.created_tx_id != first.tx_id
                || snap.created_at != first.timestamp
                || snap.latest_tx_id != last.tx_id
                || snap.block_number != last.block_number
                || snap.updated_at != last.timestamp
                || snap.is_active() == deleted
                || snap.latest_hash != bearer.payload_hash
            {
                return Ok(Some(format!("snapshot of {log_id} does not match its history")));
            }
            match ContentHasher::hash_value(&snap.latest_payload) {
                Ok(hash) if hash == snap.latest_hash => {}
                _ => return Ok(Some(format!("payload of {log_id} does not match its hash"))),
            }
            bearers.insert(log_id, bearer.tx_id);
            for entry in history {
                if entries.insert(entry.tx_id, (log_id, entry)).is_some() {
                    return Ok(Some(format!("{} appears twice", entry.tx_id)));
                }
            }
        }

        let height = store.height()?;
        let mut matched = 0usize;
        for block in store.iter_blocks(1, height) {
            let block = block?;
            for tx in &block.transactions {
                let Some((log_id, entry)) = entries.get(&tx.tx_id) else {
                    return Ok(Some(format!("{} is missing from the index", tx.tx_id)));
                };
                let Some(snap) = self.snapshots.get(*log_id) else {
                    return Ok(Some(format!("{log_id} has history but no snapshot")));
                };
                if tx.log_id != **log_id
                    || tx.tx_type != entry.tx_type
                    || tx.payload_hash != entry.payload_hash
                    || tx.timestamp != entry.timestamp
                    || block.block_number != entry.block_number
                    || tx.log_type != snap.log_type
                {
                    return Ok(Some(format!("{} does not match the chain", tx.tx_id)));
                }
                if bearers.get(log_id) == Some(&tx.tx_id)
                    && tx.detection_method != snap.detection_method
                {
                    return Ok(Some(format!("detector of {log_id} does not match the chain")));
                }
                matched += 1;
            }
        }
        if matched != entries.len() {
            return Ok(Some("index holds transactions the chain does not".into()));
        }
        Ok(None)
    }
}
