//! Key/value store trait and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::Result;

/// One operation in a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// An ordered set of writes applied atomically.
///
/// The batch is the unit of durability for ledger commits: either every
/// operation reaches the store or none does. Implementations that cannot
/// guarantee that must fail with [`crate::StoreError::Fatal`].
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append all operations of `other` after this batch's operations.
    pub fn merge(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }
}

/// Ordered byte-oriented key/value store.
///
/// The engine only ever uses string keys with well-known prefixes (see
/// `tessera_common::keys`), point reads, and atomic batch writes.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Apply every operation in `batch` atomically.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;
}

/// In-memory [`KeyValueStore`] for tests and single-process tooling.
///
/// Clones share the same underlying map, mirroring how handles to an
/// on-disk store share one database.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key } => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        store.put("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_batch_atomic_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put("a", b"1".to_vec());
        batch.put("a", b"2".to_vec());
        batch.delete("b");
        store.put("b", b"x").unwrap();
        store.write_batch(batch).unwrap();

        // Later operations in the batch win; deletes apply.
        assert_eq!(store.get("a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_clone_shares_data() {
        let store = MemoryStore::new();
        let handle = store.clone();
        store.put("shared", b"yes").unwrap();
        assert_eq!(handle.get("shared").unwrap(), Some(b"yes".to_vec()));
    }

    #[test]
    fn test_batch_merge() {
        let mut a = WriteBatch::new();
        a.put("x", b"1".to_vec());
        let mut b = WriteBatch::new();
        b.put("y", b"2".to_vec());
        a.merge(b);
        assert_eq!(a.len(), 2);
    }
}
