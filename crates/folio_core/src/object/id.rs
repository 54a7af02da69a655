//! Object identifiers.

use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

/// SHA-256 digest of an object's plaintext content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectDigest(pub [u8; 32]);

impl ObjectDigest {
    /// Computes the digest of `content`.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the digest as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to identify an object in logs.
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Immutable reference to a stored object.
///
/// The digest is computed over the plaintext content before any
/// encryption is applied. Two identifiers are equal iff their digests are
/// equal; size and key-derivation tag are carried metadata, not identity.
#[derive(Debug, Clone, Copy)]
pub struct ObjectIdentifier {
    /// Digest of the plaintext content.
    pub digest: ObjectDigest,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Optional key-derivation tag used when the object is encrypted for
    /// sync.
    pub key_tag: Option<u32>,
}

/// Encoded length of an [`ObjectIdentifier`]: digest + size + tag flag + tag.
pub(crate) const OBJECT_ID_ENCODED_LEN: usize = 32 + 8 + 1 + 4;

impl ObjectIdentifier {
    /// Creates an identifier for `content` without storing it.
    #[must_use]
    pub fn for_content(content: &[u8]) -> Self {
        Self {
            digest: ObjectDigest::of(content),
            size: content.len() as u64,
            key_tag: None,
        }
    }

    /// Returns a copy carrying the given key-derivation tag.
    #[must_use]
    pub fn with_key_tag(mut self, tag: u32) -> Self {
        self.key_tag = Some(tag);
        self
    }

    /// Encodes the identifier into a fixed-size byte layout.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(OBJECT_ID_ENCODED_LEN);
        buf.extend_from_slice(self.digest.as_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        match self.key_tag {
            Some(tag) => {
                buf.push(1);
                buf.extend_from_slice(&tag.to_le_bytes());
            }
            None => {
                buf.push(0);
                buf.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        buf
    }

    /// Decodes an identifier from its fixed-size layout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommit`] if `bytes` is not exactly the
    /// encoded length.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != OBJECT_ID_ENCODED_LEN {
            return Err(CoreError::invalid_commit(format!(
                "object identifier must be {OBJECT_ID_ENCODED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[..32]);
        let size = u64::from_le_bytes(bytes[32..40].try_into().unwrap_or_default());
        let key_tag = if bytes[40] == 1 {
            Some(u32::from_le_bytes(bytes[41..45].try_into().unwrap_or_default()))
        } else {
            None
        };
        Ok(Self {
            digest: ObjectDigest(digest),
            size,
            key_tag,
        })
    }
}

impl PartialEq for ObjectIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for ObjectIdentifier {}

impl Hash for ObjectIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.digest)
    }
}
