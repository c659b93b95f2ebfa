use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::Value;
use tlg_crypto::{canonical_string, ContentHasher};
use tlg_index::{RecordIndex, RecordStatus, TxRef, CHECKPOINT_FILE};
use tlg_store::{ChainStore, FileChainStore, FileStoreConfig, InMemoryChainStore, StoreResult};
use tlg_types::{Block, LogId, Transaction, TxId, TxType};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::health::NetworkHealth;
use crate::request::{
    ChainReport, CommitReceipt, CommitRequest, ListFilter, ListPage, RecordView, VerifyResult,
};
use crate::stats::{LedgerStats, Statistics};

/// File name of the chain segment inside the data directory.
pub const CHAIN_FILE: &str = "chain.seg";

/// Longest accepted `detectionMethod`.
const MAX_DETECTION_METHOD_LEN: usize = 128;

/// A store append that outlived the commit waiting for it.
type PendingAppend = JoinHandle<StoreResult<Block>>;

/// Derived state swapped in only after the chain store accepted a block.
struct LedgerState {
    index: RecordIndex,
    stats: LedgerStats,
    next_tx: TxId,
}

/// The threat ledger: owns the chain store and every view derived from it.
///
/// Construct one per process and share it behind an `Arc`. `commit` is the
/// only mutating call and is serialized; every other call only reads.
pub struct LedgerService {
    config: LedgerConfig,
    store: Arc<dyn ChainStore>,
    state: RwLock<LedgerState>,
    /// Serializes commits. Holds an append abandoned by a timed-out commit
    /// until it settles.
    commit_lock: Mutex<Option<PendingAppend>>,
    checkpoint_path: Option<PathBuf>,
}

impl LedgerService {
    /// Open the ledger described by `config`, rebuilding the record index
    /// unless a current checkpoint is available.
    pub async fn open(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate().map_err(LedgerError::Validation)?;

        let (store, checkpoint_path): (Arc<dyn ChainStore>, Option<PathBuf>) =
            match &config.data_dir {
                Some(dir) => {
                    let path = dir.join(CHAIN_FILE);
                    let store_config = FileStoreConfig {
                        sync_mode: config.sync_mode,
                        write_timeout: config.store_timeout(),
                    };
                    let store = tokio::task::spawn_blocking(move || {
                        FileChainStore::open(path, store_config)
                    })
                    .await
                    .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))??;
                    (Arc::new(store) as Arc<dyn ChainStore>, Some(dir.join(CHECKPOINT_FILE)))
                }
                None => (Arc::new(InMemoryChainStore::new()) as Arc<dyn ChainStore>, None),
            };

        Self::with_store(config, store, checkpoint_path).await
    }

    /// Build a service over an existing chain store.
    pub async fn with_store(
        config: LedgerConfig,
        store: Arc<dyn ChainStore>,
        checkpoint_path: Option<PathBuf>,
    ) -> LedgerResult<Self> {
        let recent_limit = config.recent_activity_limit;
        let load_store = Arc::clone(&store);
        let load_path = checkpoint_path.clone();
        let state = tokio::task::spawn_blocking(move || -> LedgerResult<LedgerState> {
            let index = RecordIndex::load_or_rebuild(load_path.as_deref(), load_store.as_ref())?;
            derive_state(load_store.as_ref(), index, recent_limit)
        })
        .await
        .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))??;

        info!(
            height = state.stats.block_height(),
            records = state.index.len(),
            active = state.index.active_count(),
            persistent = config.data_dir.is_some(),
            "ledger opened"
        );

        Ok(Self {
            config,
            store,
            state: RwLock::new(state),
            commit_lock: Mutex::new(None),
            checkpoint_path,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn ChainStore> {
        Arc::clone(&self.store)
    }

    /// Validate and append one transaction in its own block.
    ///
    /// On any error the ledger is left exactly as it was.
    pub async fn commit(&self, request: CommitRequest) -> LedgerResult<CommitReceipt> {
        let log_id = LogId::new(request.log_id)?;
        let detection_method = request.detection_method.trim().to_string();
        if detection_method.is_empty() {
            return Err(LedgerError::Validation("detectionMethod must not be empty".into()));
        }
        if detection_method.len() > MAX_DETECTION_METHOD_LEN {
            return Err(LedgerError::Validation(format!(
                "detectionMethod exceeds {MAX_DETECTION_METHOD_LEN} bytes"
            )));
        }
        let payload = match (request.tx_type, request.payload) {
            (TxType::Delete, Value::Null) => Value::Object(Default::default()),
            (_, payload @ Value::Object(_)) => payload,
            _ => {
                return Err(LedgerError::Validation("payload must be a JSON object".into()))
            }
        };
        let payload = canonical_string(&payload)?;
        let payload_hash = ContentHasher::hash(payload.as_bytes());

        let mut pending = self.commit_lock.lock().await;
        self.settle_pending(&mut pending).await?;

        let tx_id = {
            let state = self.read_state()?;
            match (request.tx_type, state.index.get_snapshot(&log_id)) {
                (TxType::Create, Some(_)) => return Err(LedgerError::DuplicateLogId(log_id)),
                (TxType::Create, None) => {}
                (_, None) => return Err(LedgerError::NotFound(log_id.to_string())),
                (_, Some(snap)) if snap.status == RecordStatus::Deleted => {
                    return Err(LedgerError::AlreadyDeleted(log_id))
                }
                (_, Some(snap)) if snap.log_type != request.log_type => {
                    return Err(LedgerError::Validation(format!(
                        "log type of {log_id} is {}, not {}",
                        snap.log_type, request.log_type
                    )))
                }
                (_, Some(_)) => {}
            }
            state.next_tx
        };

        let tx = Transaction {
            tx_id,
            log_id,
            tx_type: request.tx_type,
            log_type: request.log_type,
            detection_method,
            payload_hash,
            payload,
            timestamp: Utc::now(),
        };

        let store = Arc::clone(&self.store);
        let mut append = tokio::task::spawn_blocking(move || store.append(vec![tx]));
        let limit = self.config.store_timeout();
        let block = match tokio::time::timeout(limit, &mut append).await {
            Ok(joined) => joined
                .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))?
                .map_err(|e| {
                    warn!(%tx_id, error = %e, "commit rejected by chain store");
                    LedgerError::from(e)
                })?,
            Err(_) => {
                warn!(%tx_id, ?limit, "chain store append timed out; holding commits until it settles");
                *pending = Some(append);
                return Err(LedgerError::StoreUnavailable(format!(
                    "chain store append exceeded {limit:?}"
                )));
            }
        };

        self.apply_committed(&block)?;

        debug!(
            %tx_id,
            block = block.block_number,
            tx_type = %request.tx_type,
            hash = %payload_hash.short_hex(),
            "transaction committed"
        );
        Ok(CommitReceipt {
            tx_id,
            block_number: block.block_number,
            hash: payload_hash,
        })
    }

    /// Compare `current` with the hash recorded at the record's last
    /// CREATE or UPDATE. A mismatch is reported, not raised.
    pub fn verify(&self, log_id: &str, current: &Value) -> LedgerResult<VerifyResult> {
        let log_id = lookup_id(log_id)?;
        let stored_hash = {
            let state = self.read_state()?;
            state
                .index
                .get_snapshot(&log_id)
                .map(|s| s.latest_hash)
                .ok_or_else(|| LedgerError::NotFound(log_id.to_string()))?
        };
        let calculated_hash = ContentHasher::hash_value(current)?;
        let valid = stored_hash == calculated_hash;
        let message = if valid {
            "data matches the committed record".to_string()
        } else {
            "data does not match the committed record".to_string()
        };

        Ok(VerifyResult {
            log_id,
            valid,
            stored_hash,
            calculated_hash,
            message,
            verified_at: Utc::now(),
        })
    }

    /// Every transaction that touched `log_id`, oldest first.
    pub fn history(&self, log_id: &str) -> LedgerResult<Vec<TxRef>> {
        let state = self.read_state()?;
        state
            .index
            .get_history(&lookup_id(log_id)?)
            .map(<[TxRef]>::to_vec)
            .ok_or_else(|| LedgerError::NotFound(log_id.to_string()))
    }

    /// Current state of one record, deleted or not.
    pub fn get(&self, log_id: &str) -> LedgerResult<RecordView> {
        let state = self.read_state()?;
        state
            .index
            .get_snapshot(&lookup_id(log_id)?)
            .map(RecordView::from)
            .ok_or_else(|| LedgerError::NotFound(log_id.to_string()))
    }

    /// One page of active records matching `filter`.
    pub fn list(&self, filter: &ListFilter) -> LedgerResult<ListPage> {
        let limit = filter.effective_limit();
        let offset = filter.effective_offset();
        let state = self.read_state()?;

        let mut total = 0;
        let mut items = Vec::new();
        for snap in state.index.active(filter.order).filter(|s| filter.matches(s)) {
            if total >= offset && items.len() < limit {
                items.push(RecordView::from(snap));
            }
            total += 1;
        }

        Ok(ListPage {
            total,
            limit,
            offset,
            items,
        })
    }

    pub fn statistics(&self) -> LedgerResult<Statistics> {
        Ok(self.read_state()?.stats.snapshot())
    }

    pub fn network_health(&self) -> NetworkHealth {
        match self.store.height() {
            Ok(height) => NetworkHealth::new(&self.config.network, true, height),
            Err(e) => {
                warn!(error = %e, "chain store unreachable");
                NetworkHealth::new(&self.config.network, false, 0)
            }
        }
    }

    pub fn latest_block(&self) -> LedgerResult<Option<Block>> {
        Ok(self.store.latest_block()?)
    }

    pub fn get_block(&self, n: u64) -> LedgerResult<Block> {
        self.store
            .get_block(n)?
            .ok_or_else(|| LedgerError::NotFound(format!("block {n}")))
    }

    /// Walk the whole chain, recomputing every link, block hash, and
    /// payload hash.
    pub async fn verify_chain_integrity(&self) -> LedgerResult<ChainReport> {
        let store = Arc::clone(&self.store);
        let report = tokio::task::spawn_blocking(move || store.verify_chain_integrity())
            .await
            .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))??;

        match report.divergence {
            None => {
                info!(blocks = report.blocks_checked, "chain integrity verified");
                Ok(ChainReport {
                    intact: true,
                    blocks_checked: report.blocks_checked,
                    latest_block_hash: report.head_hash,
                })
            }
            Some(divergence) => {
                error!(
                    block = divergence.block_number(),
                    blocks_checked = report.blocks_checked,
                    error = %divergence,
                    "CHAIN INTEGRITY VIOLATION"
                );
                Err(LedgerError::ChainIntegrity(divergence))
            }
        }
    }

    /// Persist the record index checkpoint, if configured.
    pub async fn shutdown(&self) -> LedgerResult<()> {
        let mut pending = self.commit_lock.lock().await;
        if let Err(e) = self.settle_pending(&mut pending).await {
            warn!(error = %e, "skipping index checkpoint; the next open replays the chain");
            return Ok(());
        }
        let Some(path) = self.checkpoint_path.as_ref().filter(|_| self.config.checkpoint_index)
        else {
            return Ok(());
        };
        let index = self.read_state()?.index.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || index.save_checkpoint(&path))
            .await
            .map_err(|e| LedgerError::StoreUnavailable(e.to_string()))??;
        info!("ledger shut down");
        Ok(())
    }

    /// Resolve an append abandoned by an earlier timed-out commit.
    ///
    /// While it is still running no new commit may start. Once it has
    /// finished, any block it managed to persist is folded into the derived
    /// state so the next commit builds on the real chain head.
    async fn settle_pending(&self, pending: &mut Option<PendingAppend>) -> LedgerResult<()> {
        let Some(append) = pending.take() else {
            return Ok(());
        };
        if !append.is_finished() {
            *pending = Some(append);
            return Err(LedgerError::StoreUnavailable(
                "a previous chain store append is still in flight".into(),
            ));
        }
        match append.await {
            Ok(Ok(block)) => info!(block = block.block_number, "late append reached the chain"),
            Ok(Err(e)) => debug!(error = %e, "abandoned append failed"),
            Err(e) => warn!(error = %e, "abandoned append did not complete"),
        }
        self.catch_up()
    }

    /// Fold in any blocks the store holds beyond the record index.
    fn catch_up(&self) -> LedgerResult<()> {
        let height = self.store.height()?;
        let applied = self.read_state()?.index.applied_height();
        for block in self.store.iter_blocks(applied + 1, height) {
            self.apply_committed(&block?)?;
        }
        Ok(())
    }

    fn apply_committed(&self, block: &Block) -> LedgerResult<()> {
        let mut state = self.write_state()?;
        let next_tx = block.last_tx_id().map_or(state.next_tx, TxId::next);
        state.next_tx = next_tx;

        match state.index.apply_block(block) {
            Ok(changes) => {
                state.stats.apply(block, &changes);
                Ok(())
            }
            Err(e) => {
                // The block is durable, so the index must follow it.
                warn!(block = block.block_number, error = %e, "record index diverged; rebuilding");
                let index = RecordIndex::rebuild(self.store.as_ref())?;
                let rebuilt =
                    derive_state(self.store.as_ref(), index, self.config.recent_activity_limit)?;
                *state = rebuilt;
                Ok(())
            }
        }
    }

    fn read_state(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::StoreUnavailable("ledger state lock poisoned".into()))
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::StoreUnavailable("ledger state lock poisoned".into()))
    }
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("config", &self.config)
            .field("checkpoint_path", &self.checkpoint_path)
            .finish()
    }
}

fn derive_state(
    store: &dyn ChainStore,
    index: RecordIndex,
    recent_limit: usize,
) -> LedgerResult<LedgerState> {
    let stats = LedgerStats::recompute(store, &index, recent_limit)?;
    let next_tx = store
        .latest_block()?
        .and_then(|b| b.last_tx_id())
        .map_or(TxId::new(1), TxId::next);
    Ok(LedgerState {
        index,
        stats,
        next_tx,
    })
}

fn lookup_id(raw: &str) -> LedgerResult<LogId> {
    LogId::new(raw).map_err(|_| LedgerError::NotFound(raw.to_string()))
}
