//! In-memory Db backend for testing and ephemeral pages.

use crate::batch::{BatchOp, WriteBatch};
use crate::db::Db;
use crate::error::DbResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory [`Db`].
///
/// This backend keeps all data in a sorted map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral pages that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use folio_db::{Db, MemoryDb, WriteBatch};
///
/// let db = MemoryDb::new();
/// let mut batch = WriteBatch::new();
/// batch.put(b"k".to_vec(), b"v".to_vec());
/// db.apply(batch).unwrap();
/// assert!(db.contains(b"k").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct MemoryDb {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    /// Creates a new empty in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clears all data.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Db for MemoryDb {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> DbResult<()> {
        // Single write-lock scope makes the whole batch one visibility step.
        let mut data = self.data.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let db = MemoryDb::new();
        assert!(db.is_empty());
        assert_eq!(db.get(b"missing").unwrap(), None);
    }

    #[test]
    fn memory_apply_batch() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        db.apply(batch).unwrap();

        assert_eq!(db.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn memory_later_op_wins() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"old".to_vec());
        batch.put(b"k".to_vec(), b"new".to_vec());
        db.apply(batch).unwrap();

        assert_eq!(db.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn memory_delete_in_batch() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"v".to_vec());
        db.apply(batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete(b"k".to_vec());
        batch.delete(b"absent".to_vec());
        db.apply(batch).unwrap();

        assert_eq!(db.get(b"k").unwrap(), None);
    }

    #[test]
    fn memory_dropped_batch_discarded() {
        let db = MemoryDb::new();
        {
            let mut batch = WriteBatch::new();
            batch.put(b"k".to_vec(), b"v".to_vec());
            // Never applied.
            drop(batch);
        }
        assert!(db.is_empty());
    }

    #[test]
    fn memory_scan_prefix_ordered() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(b"c/2".to_vec(), b"x".to_vec());
        batch.put(b"c/1".to_vec(), b"y".to_vec());
        batch.put(b"d/1".to_vec(), b"z".to_vec());
        db.apply(batch).unwrap();

        let hits = db.scan_prefix(b"c/").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"c/1");
        assert_eq!(hits[1].0, b"c/2");
    }

    #[test]
    fn memory_scan_empty_prefix_returns_all() {
        let db = MemoryDb::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        db.apply(batch).unwrap();

        assert_eq!(db.scan_prefix(b"").unwrap().len(), 2);
    }
}
