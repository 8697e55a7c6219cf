//! SHA-256 digests and canonical hashing of data-model values.
//!
//! Every hash that peers must agree on (header hash, consensus-value
//! hash, validator-set hash, fee-config hash, transaction content hash)
//! is the SHA-256 of the value's canonical bincode encoding. All maps in
//! the data model are `BTreeMap`, so the encoding is deterministic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Hash raw bytes.
    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash256(hasher.finalize().into())
    }

    /// The all-zero digest, used for "no previous hash" at genesis.
    pub fn zero() -> Self {
        Hash256([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash256({})", &self.to_hex()[..8])
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Canonical hash of any serializable value: SHA-256 over its bincode
/// encoding.
pub fn hash_of<T: Serialize>(value: &T) -> Hash256 {
    // bincode encoding of our data model cannot fail: no untagged enums,
    // no maps with non-string keys beyond ordered BTreeMaps.
    let bytes = bincode::serialize(value).unwrap_or_default();
    Hash256::hash(&bytes)
}
