//! Ledger service for the threat ledger.
//!
//! [`LedgerService`] owns the chain store and the record index and is the
//! only path that mutates either. Commits are serialized behind one lock;
//! reads share a read lock on the index and statistics and never observe a
//! half-applied commit.
//!
//! # Key Types
//!
//! - [`LedgerService`] -- commit, verify, history, list, statistics, audit
//! - [`LedgerConfig`] -- storage, timeouts, audit cadence, network identity
//! - [`Statistics`] -- aggregate counts and recent activity
//! - [`NetworkHealth`] -- static ledger identity descriptor
//! - [`ChainAuditor`] -- optional periodic integrity audit

pub mod audit;
pub mod config;
pub mod error;
pub mod health;
pub mod request;
pub mod service;
pub mod stats;

pub use audit::{AuditHandle, ChainAuditor};
pub use config::{LedgerConfig, NetworkConfig};
pub use error::{LedgerError, LedgerResult};
pub use health::{NetworkHealth, NetworkStatus};
pub use request::{
    ChainReport, CommitReceipt, CommitRequest, ListFilter, ListPage, RecordView, VerifyResult,
};
pub use service::LedgerService;
pub use stats::{ActivityEntry, LedgerStats, Statistics};

pub use tlg_index::{ListOrder, RecordStatus, TxRef};
pub use tlg_types::{Block, LogId, LogType, TxType};
