//! Record index for the threat ledger.
//!
//! The index is a derived cache over the chain store: for every `logId` it
//! holds the latest snapshot and the ordered list of transactions that
//! touched it. It is never the source of truth and can always be rebuilt by
//! replaying the chain from genesis.
//!
//! # Key Types
//!
//! - [`RecordIndex`] -- snapshots, history, and active-record ordering
//! - [`LedgerSnapshot`] -- current materialized state of one record
//! - [`TxRef`] -- one entry in a record's history
//! - [`RecordStatus`] / [`ListOrder`]

pub mod checkpoint;
pub mod error;
pub mod index;
pub mod snapshot;

pub use checkpoint::CHECKPOINT_FILE;
pub use error::{IndexError, IndexResult};
pub use index::{AppliedChange, ListOrder, RecordIndex};
pub use snapshot::{LedgerSnapshot, RecordStatus, TxRef};
