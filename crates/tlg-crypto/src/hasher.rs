use serde::Serialize;
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use tlg_types::Digest;

use crate::canonical::{canonicalize, canonicalize_serializable, CanonicalError};

/// SHA-256 content hasher over canonical encodings.
///
/// Payload hashes are plain SHA-256 with no domain prefix, so any party
/// holding the payload can recompute them with a stock SHA-256 tool after
/// canonical encoding.
pub struct ContentHasher;

impl ContentHasher {
    /// SHA-256 of raw bytes.
    pub fn hash(data: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest::from_hash(hasher.finalize().into())
    }

    /// SHA-256 of a structured value's canonical encoding.
    pub fn hash_value(value: &Value) -> Result<Digest, CanonicalError> {
        Ok(Self::hash(&canonicalize(value)?))
    }

    /// SHA-256 of any serializable value's canonical encoding.
    pub fn hash_serializable<T: Serialize>(value: &T) -> Result<Digest, CanonicalError> {
        Ok(Self::hash(&canonicalize_serializable(value)?))
    }

    /// Check that `data` hashes to `expected`.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::hash(data) == *expected
    }
}
