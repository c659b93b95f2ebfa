//! Foundation types for the threat ledger.
//!
//! Every other `tlg-*` crate depends on this one. The types here are the
//! persisted vocabulary of the ledger: what a transaction and a block look
//! like on disk and on the wire.
//!
//! # Key Types
//!
//! - [`LogId`] -- caller-supplied, immutable identifier of a threat record
//! - [`TxId`] -- globally unique, monotonic transaction number
//! - [`Digest`] -- SHA-256 digest rendered as lowercase hex
//! - [`TxType`] / [`LogType`] -- transaction and record classification
//! - [`Transaction`] / [`Block`] -- the chain's persisted units

pub mod block;
pub mod digest;
pub mod error;
pub mod ids;
pub mod kind;

pub use block::{Block, Transaction, TxSummary};
pub use digest::{Digest, GENESIS_HASH};
pub use error::TypeError;
pub use ids::{LogId, TxId, MAX_LOG_ID_LEN};
pub use kind::{LogType, TxType};
