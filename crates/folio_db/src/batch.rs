//! Atomic write batches.

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put {
        /// The key to write.
        key: Vec<u8>,
        /// The value to store.
        value: Vec<u8>,
    },
    /// Remove a key. Removing an absent key is a no-op.
    Delete {
        /// The key to remove.
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Returns the key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// A group of puts and deletes applied atomically.
///
/// A batch records operations in order; later operations on the same key
/// win. The batch takes effect only when handed to [`Db::apply`]; dropping
/// an unapplied batch discards every pending operation.
///
/// [`Db::apply`]: crate::Db::apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a put operation.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    /// Appends a delete operation.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    /// Returns the recorded operations in order.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if no operations have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch and returns its operations.
    #[must_use]
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    /// Merges another batch's operations onto the end of this one.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_records_ops_in_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.delete(b"b".to_vec());
        batch.put(b"c".to_vec(), b"3".to_vec());

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0].key(), b"a");
        assert_eq!(batch.ops()[1].key(), b"b");
        assert_eq!(batch.ops()[2].key(), b"c");
    }

    #[test]
    fn empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn extend_appends() {
        let mut a = WriteBatch::new();
        a.put(b"x".to_vec(), b"1".to_vec());

        let mut b = WriteBatch::new();
        b.delete(b"y".to_vec());

        a.extend(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.ops()[1].key(), b"y");
    }
}
