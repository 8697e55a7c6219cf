//! Account-tree commitment seam.
//!
//! The ledger header carries a single hash committing to every account
//! record. The engine only needs three things from whatever structure
//! provides that commitment: point reads, buffered writes, and a root
//! hash that reflects the buffered writes once they are folded in.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_common::Hash256;

use crate::Result;

/// Keyed store over serialized account records with a commitment hash.
///
/// Writes are buffered in the caller's own layers (the execution
/// environment); the trie only ever sees the flattened result of a
/// committed ledger, one `set` per touched account, followed by a single
/// `update_hash`.
pub trait AccountTrie: Send + Sync {
    /// Read the serialized record stored under `address`, if any.
    fn get(&self, address: &str) -> Result<Option<Vec<u8>>>;

    /// Store the serialized record for `address`. Visible to `get`
    /// immediately; reflected in `root_hash` after `update_hash`.
    fn set(&self, address: &str, record: &[u8]) -> Result<()>;

    /// Recompute the commitment over the current contents.
    fn update_hash(&self) -> Result<Hash256>;

    /// The commitment as of the last `update_hash`.
    fn root_hash(&self) -> Hash256;
}

/// In-memory [`AccountTrie`] whose commitment is a sorted fold:
/// SHA-256 over `(address, record)` pairs in address order.
///
/// Not a Merkle structure and not proof-capable, but deterministic, so
/// two nodes applying the same ledgers agree on the root. The real node
/// substitutes a Merkle trie behind the same trait.
#[derive(Debug, Default, Clone)]
pub struct MemoryTrie {
    inner: Arc<RwLock<MemoryTrieInner>>,
}

#[derive(Debug, Default)]
struct MemoryTrieInner {
    records: BTreeMap<String, Vec<u8>>,
    root: Hash256,
}

impl MemoryTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

impl AccountTrie for MemoryTrie {
    fn get(&self, address: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().records.get(address).cloned())
    }

    fn set(&self, address: &str, record: &[u8]) -> Result<()> {
        self.inner
            .write()
            .records
            .insert(address.to_string(), record.to_vec());
        Ok(())
    }

    fn update_hash(&self) -> Result<Hash256> {
        let mut inner = self.inner.write();
        let mut buf = Vec::new();
        for (address, record) in &inner.records {
            buf.extend_from_slice(&(address.len() as u64).to_le_bytes());
            buf.extend_from_slice(address.as_bytes());
            buf.extend_from_slice(&(record.len() as u64).to_le_bytes());
            buf.extend_from_slice(record);
        }
        inner.root = Hash256::hash(&buf);
        Ok(inner.root)
    }

    fn root_hash(&self) -> Hash256 {
        self.inner.read().root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let trie = MemoryTrie::new();
        assert_eq!(trie.get("a").unwrap(), None);
        trie.set("a", b"rec").unwrap();
        assert_eq!(trie.get("a").unwrap(), Some(b"rec".to_vec()));
    }

    #[test]
    fn test_root_reflects_update_only() {
        let trie = MemoryTrie::new();
        trie.set("a", b"1").unwrap();
        assert!(trie.root_hash().is_zero());
        let root = trie.update_hash().unwrap();
        assert_eq!(trie.root_hash(), root);
        assert!(!root.is_zero());
    }

    #[test]
    fn test_root_independent_of_insertion_order() {
        let one = MemoryTrie::new();
        one.set("alice", b"1").unwrap();
        one.set("bob", b"2").unwrap();

        let two = MemoryTrie::new();
        two.set("bob", b"2").unwrap();
        two.set("alice", b"1").unwrap();

        assert_eq!(one.update_hash().unwrap(), two.update_hash().unwrap());
    }

    #[test]
    fn test_root_changes_with_content() {
        let trie = MemoryTrie::new();
        trie.set("a", b"1").unwrap();
        let before = trie.update_hash().unwrap();
        trie.set("a", b"2").unwrap();
        let after = trie.update_hash().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_length_prefix_disambiguates() {
        // ("ab","c") must not collide with ("a","bc").
        let one = MemoryTrie::new();
        one.set("ab", b"c").unwrap();
        let two = MemoryTrie::new();
        two.set("a", b"bc").unwrap();
        assert_ne!(one.update_hash().unwrap(), two.update_hash().unwrap());
    }
}
