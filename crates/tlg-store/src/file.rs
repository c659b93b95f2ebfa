use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tlg_types::{Block, Transaction};
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{seal_block, BlockIter, ChainStore};

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Flush/sync strategy for the segment file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every block.
    #[default]
    EveryWrite,
    /// Flush to the OS and let it decide when to hit the disk.
    OsDefault,
}

/// Configuration for [`FileChainStore`].
#[derive(Clone, Debug)]
pub struct FileStoreConfig {
    pub sync_mode: SyncMode,
    /// Upper bound on a single append, measured from the first byte
    /// written to the end of the sync.
    pub write_timeout: Duration,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            write_timeout: Duration::from_secs(5),
        }
    }
}

struct Segment {
    file: File,
    /// Byte length of the valid prefix of the file.
    offset: u64,
    blocks: Vec<Block>,
    tx_count: u64,
    /// Set when a failed append left bytes past `offset` that could not
    /// be removed.
    broken: Option<String>,
}

/// Chain store backed by a single append-only segment file.
///
/// On-disk format, one frame per block:
/// ```text
/// [4 bytes: frame length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Block)]
/// ```
///
/// The file is read front-to-back on open. A frame cut short at the end of
/// the file is a torn write from a crash and is truncated away; a complete
/// frame that fails its CRC or cannot be decoded is reported as corruption.
/// Decoded blocks are cached in memory for reads.
///
/// The segment is held under an exclusive advisory lock for the lifetime of
/// the store, so only one writer can extend it.
pub struct FileChainStore {
    path: PathBuf,
    config: FileStoreConfig,
    segment: RwLock<Segment>,
}

impl FileChainStore {
    /// Open (or create) the segment file at `path`.
    pub fn open(path: impl AsRef<Path>, config: FileStoreConfig) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if let Err(e) = file.try_lock_exclusive() {
            debug!(path = %path.display(), error = %e, "segment lock not acquired");
            return Err(StoreError::Locked {
                path: path.to_path_buf(),
            });
        }

        let (blocks, offset) = recover(&file)?;
        let file_len = file.metadata()?.len();
        if offset < file_len {
            warn!(
                path = %path.display(),
                offset,
                file_len,
                "torn block frame at end of segment; truncating"
            );
            file.set_len(offset)?;
            file.sync_all()?;
        }

        let tx_count = blocks.iter().map(|b| b.tx_count() as u64).sum();
        info!(path = %path.display(), height = blocks.len(), tx_count, "chain segment opened");

        Ok(Self {
            path: path.to_path_buf(),
            config,
            segment: RwLock::new(Segment {
                file,
                offset,
                blocks,
                tx_count,
                broken: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Segment>> {
        self.segment.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_frame(&self, file: &mut File, frame: &[u8], started: Instant) -> StoreResult<()> {
        file.write_all(frame)?;
        file.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            file.sync_data()?;
        }
        if started.elapsed() >= self.config.write_timeout {
            return Err(StoreError::Timeout {
                limit: self.config.write_timeout,
            });
        }
        Ok(())
    }
}

impl ChainStore for FileChainStore {
    fn append(&self, transactions: Vec<Transaction>) -> StoreResult<Block> {
        let mut seg = self.segment.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(reason) = &seg.broken {
            return Err(StoreError::Broken {
                reason: reason.clone(),
            });
        }
        let block = seal_block(seg.blocks.last(), transactions)?;

        let payload =
            bincode::serialize(&block).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len()).map_err(|_| {
            StoreError::Serialization(format!("block of {} bytes exceeds frame limit", payload.len()))
        })?;
        let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let start_offset = seg.offset;
        let started = Instant::now();
        if let Err(e) = self.write_frame(&mut seg.file, &frame, started) {
            // Roll the file back so the failed block never becomes visible.
            if let Err(rollback) = seg.file.set_len(start_offset) {
                error!(offset = start_offset, error = %rollback, "segment rollback failed");
                seg.broken = Some(format!(
                    "rollback of block {} at offset {start_offset} failed: {rollback}",
                    block.block_number
                ));
            }
            warn!(block = block.block_number, error = %e, "block append failed");
            return Err(e);
        }

        seg.offset += frame.len() as u64;
        seg.tx_count += block.tx_count() as u64;
        seg.blocks.push(block.clone());

        debug!(
            block = block.block_number,
            offset = start_offset,
            len = frame.len(),
            "block appended"
        );
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

impl Drop for FileChainStore {
    fn drop(&mut self) {
        if let Ok(seg) = self.segment.get_mut() {
            let _ = FileExt::unlock(&seg.file);
        }
    }
}

impl std::fmt::Debug for FileChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChainStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

/// Read every complete frame. Returns the blocks and the length of the
/// valid prefix; anything past it is a torn tail.
fn recover(file: &File) -> StoreResult<(Vec<Block>, u64)> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut blocks = Vec::new();
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE <= file_len {
        let mut header = [0u8; HEADER_SIZE as usize];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if length == 0 || offset + HEADER_SIZE + u64::from(length) > file_len {
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(StoreError::Corrupt {
                offset,
                reason: format!("CRC mismatch: expected {expected_crc:#010x}, found {actual_crc:#010x}"),
            });
        }

        let block: Block = bincode::deserialize(&payload).map_err(|e| StoreError::Corrupt {
            offset,
            reason: format!("undecodable block: {e}"),
        })?;
        blocks.push(block);
        offset += HEADER_SIZE + u64::from(length);
    }

    debug!(recovered = blocks.len(), offset, "segment recovery complete");
    Ok((blocks, offset))
}

#[cfg(test)]
mod tests {
    use std::io::{Seek, SeekFrom};

    use chrono::Utc;
    use tlg_crypto::{canonical_string, ContentHasher};
    use tlg_types::{LogId, LogType, TxId, TxType};

    use super::*;

    fn tx(n: u64) -> Transaction {
        let payload =
            canonical_string(&serde_json::json!({"type": "port_scan", "n": n})).unwrap();
        Transaction {
            tx_id: TxId::new(n),
            log_id: LogId::new(format!("NT-{n}")).unwrap(),
            tx_type: TxType::Create,
            log_type: LogType::NetworkThreat,
            detection_method: "network_ai_service".into(),
            payload_hash: ContentHasher::hash(payload.as_bytes()),
            payload,
            timestamp: Utc::now(),
        }
    }

    fn open(path: &Path) -> FileChainStore {
        FileChainStore::open(path, FileStoreConfig::default()).unwrap()
    }

    #[test]
    fn blocks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");

        let (b1, b2) = {
            let store = open(&path);
            let b1 = store.append(vec![tx(1)]).unwrap();
            let b2 = store.append(vec![tx(2), tx(3)]).unwrap();
            (b1, b2)
        };

        let store = open(&path);
        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(store.tx_count().unwrap(), 3);
        assert_eq!(store.get_block(1).unwrap().unwrap(), b1);
        assert_eq!(store.latest_block().unwrap().unwrap(), b2);
        assert!(store.verify_chain_integrity().unwrap().is_intact());

        let b3 = store.append(vec![tx(4)]).unwrap();
        assert_eq!(b3.block_number, 3);
        assert_eq!(b3.previous_block_hash, b2.block_hash);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("chain.seg");
        let store = open(&path);
        assert_eq!(store.height().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        {
            let store = open(&path);
            store.append(vec![tx(1)]).unwrap();
            store.append(vec![tx(2)]).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();

        // Half a header plus a few stray bytes.
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[0xFF, 0x01, 0x00, 0x00, 0xAB, 0xCD]).unwrap();
        drop(f);

        let store = open(&path);
        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        assert_eq!(store.append(vec![tx(3)]).unwrap().block_number, 3);
    }

    #[test]
    fn crc_mismatch_is_reported_as_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        {
            let store = open(&path);
            store.append(vec![tx(1)]).unwrap();
        }

        let mut f = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start(HEADER_SIZE + 4)).unwrap();
        let mut byte = [0u8; 1];
        f.read_exact(&mut byte).unwrap();
        f.seek(SeekFrom::Start(HEADER_SIZE + 4)).unwrap();
        f.write_all(&[byte[0] ^ 0xFF]).unwrap();
        drop(f);

        let err = FileChainStore::open(&path, FileStoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { offset: 0, .. }));
    }

    #[test]
    fn timed_out_append_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        {
            let store = open(&path);
            store.append(vec![tx(1)]).unwrap();
        }
        let len_before = fs::metadata(&path).unwrap().len();

        let config = FileStoreConfig {
            sync_mode: SyncMode::OsDefault,
            write_timeout: Duration::ZERO,
        };
        let store = FileChainStore::open(&path, config).unwrap();
        let err = store.append(vec![tx(2)]).unwrap_err();
        assert!(matches!(err, StoreError::Timeout { .. }));
        assert!(err.is_transient());

        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(store.tx_count().unwrap(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
        drop(store);

        let reopened = open(&path);
        assert_eq!(reopened.height().unwrap(), 1);
        assert!(reopened.verify_chain_integrity().unwrap().is_intact());
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        let store = open(&path);
        store.append(vec![tx(1)]).unwrap();

        let err = FileChainStore::open(&path, FileStoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));
        assert!(!err.is_transient());

        drop(store);
        let reopened = open(&path);
        assert_eq!(reopened.height().unwrap(), 1);
    }

    #[test]
    fn broken_segment_refuses_appends_until_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        let store = open(&path);
        store.append(vec![tx(1)]).unwrap();
        let len_before = fs::metadata(&path).unwrap().len();

        // State left behind when a failed append cannot be truncated away.
        store.segment.write().unwrap().broken = Some("rollback failed".into());

        let err = store.append(vec![tx(2)]).unwrap_err();
        assert!(matches!(err, StoreError::Broken { .. }));
        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
        drop(store);

        let reopened = open(&path);
        assert_eq!(reopened.append(vec![tx(2)]).unwrap().block_number, 2);
        assert!(reopened.verify_chain_integrity().unwrap().is_intact());
    }

    #[test]
    fn rejected_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.seg");
        let store = open(&path);
        assert!(matches!(store.append(vec![]), Err(StoreError::EmptyBatch)));
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn sync_mode_uses_snake_case() {
        let mode: SyncMode = serde_json::from_str("\"os_default\"").unwrap();
        assert_eq!(mode, SyncMode::OsDefault);
        assert_eq!(
            serde_json::to_string(&SyncMode::EveryWrite).unwrap(),
            "\"every_write\""
        );
    }
}
