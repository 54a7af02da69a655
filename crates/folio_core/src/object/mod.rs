//! Content-addressed object storage.

mod id;
mod store;

pub use id::{ObjectDigest, ObjectIdentifier};
pub use store::{ObjectStore, ObjectStoreConfig};
pub(crate) use store::staged_object_digests;

/// Byte length of an encoded [`ObjectIdentifier`].
pub(crate) fn id_encoded_len() -> usize {
    id::OBJECT_ID_ENCODED_LEN
}
