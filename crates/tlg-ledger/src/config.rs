use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tlg_store::SyncMode;

/// Ledger service configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Directory holding the chain segment and index checkpoint.
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// Upper bound on one chain store append, in milliseconds.
    pub store_timeout_ms: u64,
    pub sync_mode: SyncMode,
    /// How many transactions `statistics()` reports as recent activity.
    pub recent_activity_limit: usize,
    /// Period of the background integrity audit. `None` disables it.
    pub audit_interval_secs: Option<u64>,
    /// Persist the record index on shutdown so the next start can skip replay.
    pub checkpoint_index: bool,
    pub network: NetworkConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_timeout_ms: 5_000,
            sync_mode: SyncMode::default(),
            recent_activity_limit: 10,
            audit_interval_secs: None,
            checkpoint_index: true,
            network: NetworkConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// In-memory configuration, mostly for tests.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed configuration rooted at `dir`.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn audit_interval(&self) -> Option<Duration> {
        self.audit_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store_timeout_ms == 0 {
            return Err("store_timeout_ms must be greater than zero".into());
        }
        if self.recent_activity_limit == 0 {
            return Err("recent_activity_limit must be greater than zero".into());
        }
        Ok(())
    }
}

/// Identity of the ledger as reported by the network health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub channel: String,
    pub chaincode: String,
    pub network: String,
    pub consensus: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel: "usod-channel".into(),
            chaincode: "threat-logger".into(),
            network: "Hyperledger Fabric".into(),
            consensus: "solo".into(),
        }
    }
}
