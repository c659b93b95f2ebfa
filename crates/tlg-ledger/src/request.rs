//! Request and response shapes of the ledger API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tlg_index::{LedgerSnapshot, ListOrder, RecordStatus};
use tlg_types::{Digest, LogId, LogType, TxId, TxType};

/// Largest page `list` will return.
pub const MAX_PAGE_SIZE: usize = 500;

/// Default page size for `list`.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// A change to commit to the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub log_id: String,
    pub log_type: LogType,
    pub detection_method: String,
    pub payload: Value,
    #[serde(rename = "type")]
    pub tx_type: TxType,
}

impl CommitRequest {
    pub fn create(
        log_id: impl Into<String>,
        log_type: LogType,
        detection_method: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            log_id: log_id.into(),
            log_type,
            detection_method: detection_method.into(),
            payload,
            tx_type: TxType::Create,
        }
    }

    pub fn update(
        log_id: impl Into<String>,
        log_type: LogType,
        detection_method: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            tx_type: TxType::Update,
            ..Self::create(log_id, log_type, detection_method, payload)
        }
    }

    pub fn delete(
        log_id: impl Into<String>,
        log_type: LogType,
        detection_method: impl Into<String>,
    ) -> Self {
        Self {
            tx_type: TxType::Delete,
            ..Self::create(log_id, log_type, detection_method, Value::Null)
        }
    }
}

/// What a successful commit produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReceipt {
    pub tx_id: TxId,
    pub block_number: u64,
    /// Hash of the committed payload.
    pub hash: Digest,
}

/// Outcome of comparing caller data with the last committed hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub log_id: LogId,
    pub valid: bool,
    pub stored_hash: Digest,
    pub calculated_hash: Digest,
    pub message: String,
    pub verified_at: DateTime<Utc>,
}

/// Filter and paging for `list`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListFilter {
    pub log_type: Option<LogType>,
    /// Matches the payload's `severity`, case-insensitively.
    pub severity: Option<String>,
    /// Matches the payload's `type`.
    #[serde(rename = "type")]
    pub threat_type: Option<String>,
    /// Matches the payload's `sourceIP`.
    pub source_ip: Option<String>,
    pub detection_method: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: ListOrder,
}

impl ListFilter {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, snap: &LedgerSnapshot) -> bool {
        if self.log_type.is_some_and(|t| t != snap.log_type) {
            return false;
        }
        if let Some(method) = &self.detection_method {
            if &snap.detection_method != method {
                return false;
            }
        }
        if let Some(severity) = &self.severity {
            match snap.payload_str("severity") {
                Some(s) if s.eq_ignore_ascii_case(severity) => {}
                _ => return false,
            }
        }
        if let Some(t) = &self.threat_type {
            if snap.payload_str("type") != Some(t.as_str()) {
                return false;
            }
        }
        if let Some(ip) = &self.source_ip {
            if snap.payload_str("sourceIP") != Some(ip.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One page of `list` results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    /// Matching records before paging.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub items: Vec<RecordView>,
}

/// Public view of a record's current state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub log_id: LogId,
    pub log_type: LogType,
    pub detection_method: String,
    pub payload: Value,
    pub hash: Digest,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub latest_tx_id: TxId,
    pub block_number: u64,
}

impl From<&LedgerSnapshot> for RecordView {
    fn from(snap: &LedgerSnapshot) -> Self {
        Self {
            log_id: snap.log_id.clone(),
            log_type: snap.log_type,
            detection_method: snap.detection_method.clone(),
            payload: snap.latest_payload.clone(),
            hash: snap.latest_hash,
            status: snap.status,
            created_at: snap.created_at,
            updated_at: snap.updated_at,
            latest_tx_id: snap.latest_tx_id,
            block_number: snap.block_number,
        }
    }
}

/// Result of a successful full-chain audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    pub intact: bool,
    pub blocks_checked: u64,
    pub latest_block_hash: Digest,
}
