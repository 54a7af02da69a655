//! The Db trait.

use crate::batch::WriteBatch;
use crate::error::DbResult;

/// An ordered byte-string key-value store with atomic batched writes.
///
/// Implementations must apply a [`WriteBatch`] atomically: either every
/// operation in the batch becomes visible or none does. Readers never
/// observe a partially applied batch.
pub trait Db: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Applies all operations in `batch` atomically.
    fn apply(&self, batch: WriteBatch) -> DbResult<()>;

    /// Returns all `(key, value)` pairs whose key starts with `prefix`,
    /// in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Returns true if `key` is present.
    fn contains(&self, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
