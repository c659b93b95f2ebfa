//! Append-only chain store for the threat ledger.
//!
//! The chain store is the persistence root: an ordered sequence of
//! [`Block`](tlg_types::Block)s, each linked to its predecessor's hash.
//! Everything else in the ledger is derived from it.
//!
//! # Storage Backends
//!
//! All backends implement the [`ChainStore`] trait:
//!
//! - [`InMemoryChainStore`] -- `Vec`-backed store for tests and embedding
//! - [`FileChainStore`] -- single append-only segment file with length and
//!   CRC32 framing, recovered front-to-back on open
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once appended; there is no update or delete.
//! 2. `append` is all-or-nothing: on any failure nothing becomes visible.
//! 3. Block numbers, previous-hash links, and block hashes are assigned by
//!    the store, never by callers.
//! 4. Corruption is reported by [`ChainStore::verify_chain_integrity`],
//!    never repaired.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileChainStore, FileStoreConfig, SyncMode};
pub use memory::InMemoryChainStore;
pub use traits::{seal_block, BlockIter, ChainStore, IntegrityReport};
