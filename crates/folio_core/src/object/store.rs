//! Content-addressed object store layered on a Db.

use crate::error::{CoreError, CoreResult};
use crate::object::id::{ObjectDigest, ObjectIdentifier};
use folio_db::{Db, WriteBatch};
use std::sync::Arc;

const CONTENT_PREFIX: &[u8] = b"o/";
const REFCOUNT_PREFIX: &[u8] = b"r/";

/// Configuration for an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Re-verify the content digest on every read.
    ///
    /// A mismatch is reported as [`CoreError::CorruptObject`].
    pub verify_on_read: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            verify_on_read: true,
        }
    }
}

/// Content-addressed blob storage.
///
/// Objects are immutable and keyed by the digest of their content, so
/// storing identical content twice stores one blob. Reference counts track
/// which objects are reachable from live commits; unreferenced objects are
/// removed by [`collect_garbage`](Self::collect_garbage), run out of band.
pub struct ObjectStore {
    db: Arc<dyn Db>,
    config: ObjectStoreConfig,
}

impl ObjectStore {
    /// Creates an object store over `db`.
    pub fn new(db: Arc<dyn Db>, config: ObjectStoreConfig) -> Self {
        Self { db, config }
    }

    /// Stores `content` and returns its identifier.
    ///
    /// Idempotent: duplicate content returns the same identifier without
    /// writing a second blob.
    pub fn store_object(&self, content: &[u8]) -> CoreResult<ObjectIdentifier> {
        let id = ObjectIdentifier::for_content(content);
        let key = content_key(&id.digest);
        if !self.db.contains(&key)? {
            let mut batch = WriteBatch::new();
            batch.put(key, content.to_vec());
            self.db.apply(batch)?;
        }
        Ok(id)
    }

    /// Stages `content` into `batch` and returns its identifier.
    ///
    /// Used by the commit path so new tree nodes become visible in the same
    /// atomic batch as the commit that references them.
    pub fn stage_object(&self, batch: &mut WriteBatch, content: &[u8]) -> CoreResult<ObjectIdentifier> {
        let id = ObjectIdentifier::for_content(content);
        let key = content_key(&id.digest);
        if !self.db.contains(&key)? {
            batch.put(key, content.to_vec());
        }
        Ok(id)
    }

    /// Returns the content of the object identified by `id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::ObjectNotFound`] if the object is not stored;
    /// [`CoreError::CorruptObject`] if verification is configured and the
    /// stored bytes do not hash to the identifier's digest.
    pub fn get_object(&self, id: &ObjectIdentifier) -> CoreResult<Vec<u8>> {
        let content = self
            .db
            .get(&content_key(&id.digest))?
            .ok_or_else(|| CoreError::object_not_found(id.digest.to_hex()))?;

        if self.config.verify_on_read {
            let actual = ObjectDigest::of(&content);
            if actual != id.digest {
                return Err(CoreError::CorruptObject {
                    expected: id.digest.to_hex(),
                    actual: actual.to_hex(),
                });
            }
        }
        Ok(content)
    }

    /// Returns the content of `id`, consulting objects staged into `batch`
    /// before the applied db.
    ///
    /// The commit path stages new tree nodes into its batch and must read
    /// them back while that batch is still pending.
    pub(crate) fn get_object_staged(
        &self,
        batch: &WriteBatch,
        id: &ObjectIdentifier,
    ) -> CoreResult<Vec<u8>> {
        let key = content_key(&id.digest);
        for op in batch.ops().iter().rev() {
            if let folio_db::BatchOp::Put { key: staged, value } = op {
                if *staged == key {
                    return Ok(value.clone());
                }
            }
        }
        self.get_object(id)
    }

    /// Returns true if the object is stored.
    pub fn has_object(&self, id: &ObjectIdentifier) -> CoreResult<bool> {
        Ok(self.db.contains(&content_key(&id.digest))?)
    }

    /// Stages a reference-count increment into `batch`.
    ///
    /// Counts are read-modify-write; callers serialize batches through the
    /// single storage scheduler.
    pub fn inc_ref(&self, batch: &mut WriteBatch, id: &ObjectIdentifier) -> CoreResult<()> {
        self.inc_ref_digest(batch, &id.digest)
    }

    pub(crate) fn inc_ref_digest(
        &self,
        batch: &mut WriteBatch,
        digest: &ObjectDigest,
    ) -> CoreResult<()> {
        let count = self.ref_count_digest(digest)?;
        batch.put(refcount_key(digest), (count + 1).to_le_bytes().to_vec());
        Ok(())
    }

    /// Increments an object's reference count in its own batch.
    ///
    /// Used when an object arrives from sync outside a commit batch, so
    /// garbage collection keeps it until a commit references it.
    pub fn pin_object(&self, id: &ObjectIdentifier) -> CoreResult<()> {
        let mut batch = WriteBatch::new();
        self.inc_ref(&mut batch, id)?;
        self.db.apply(batch)?;
        Ok(())
    }

    /// Stages a reference-count decrement into `batch`.
    ///
    /// Reaching zero removes the count entry; the blob itself stays until
    /// the next garbage collection sweep.
    pub fn dec_ref(&self, batch: &mut WriteBatch, id: &ObjectIdentifier) -> CoreResult<()> {
        let count = self.ref_count(id)?;
        if count <= 1 {
            batch.delete(refcount_key(&id.digest));
        } else {
            batch.put(refcount_key(&id.digest), (count - 1).to_le_bytes().to_vec());
        }
        Ok(())
    }

    /// Returns the current reference count for `id`.
    pub fn ref_count(&self, id: &ObjectIdentifier) -> CoreResult<u64> {
        self.ref_count_digest(&id.digest)
    }

    fn ref_count_digest(&self, digest: &ObjectDigest) -> CoreResult<u64> {
        match self.db.get(&refcount_key(digest))? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| folio_db::DbError::corrupt("bad refcount encoding"))?;
                Ok(u64::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    /// Removes every stored blob with a zero reference count.
    ///
    /// Returns the number of blobs removed. Must run between commits, never
    /// concurrently with one.
    pub fn collect_garbage(&self) -> CoreResult<usize> {
        let mut batch = WriteBatch::new();
        let mut removed = 0usize;
        for (key, _) in self.db.scan_prefix(CONTENT_PREFIX)? {
            let digest_bytes = &key[CONTENT_PREFIX.len()..];
            let mut refkey = REFCOUNT_PREFIX.to_vec();
            refkey.extend_from_slice(digest_bytes);
            if !self.db.contains(&refkey)? {
                batch.delete(key);
                removed += 1;
            }
        }
        if !batch.is_empty() {
            self.db.apply(batch)?;
        }
        if removed > 0 {
            tracing::debug!(removed, "object garbage collected");
        }
        Ok(removed)
    }

    /// Returns the underlying db handle.
    pub(crate) fn db(&self) -> &Arc<dyn Db> {
        &self.db
    }
}

/// Digests of every object blob staged into `batch` so far.
pub(crate) fn staged_object_digests(batch: &WriteBatch) -> Vec<ObjectDigest> {
    let mut digests = Vec::new();
    for op in batch.ops() {
        if let folio_db::BatchOp::Put { key, .. } = op {
            if key.len() == CONTENT_PREFIX.len() + 32 && key.starts_with(CONTENT_PREFIX) {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&key[CONTENT_PREFIX.len()..]);
                digests.push(ObjectDigest(digest));
            }
        }
    }
    digests
}

fn content_key(digest: &ObjectDigest) -> Vec<u8> {
    let mut key = CONTENT_PREFIX.to_vec();
    key.extend_from_slice(digest.as_bytes());
    key
}

fn refcount_key(digest: &ObjectDigest) -> Vec<u8> {
    let mut key = REFCOUNT_PREFIX.to_vec();
    key.extend_from_slice(digest.as_bytes());
    key
}
