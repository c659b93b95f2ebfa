//! Cryptographic primitives for the threat ledger.
//!
//! Provides deterministic canonical JSON encoding, SHA-256 content hashing,
//! and verification of the block hash chain.
//!
//! All hashing wraps the `sha2` crate; no custom cryptography.

pub mod canonical;
pub mod chain;
pub mod hasher;

pub use canonical::{canonical_string, canonicalize, canonicalize_serializable, CanonicalError};
pub use chain::{block_hash, ChainError, ChainVerifier};
pub use hasher::ContentHasher;
