//! The commit pack container format.
//!
//! A pack is the unit of upload and download: one or more commits for a
//! page, each bundled with the encrypted objects another device needs to
//! apply it. All multi-byte integers are little-endian; all payloads are
//! opaque ciphertext.
//!
//! Layout:
//!
//! ```text
//! magic    4 bytes  "FPCK"
//! version  1 byte
//! count    u32
//! entries  count times:
//!   page_id    16 bytes
//!   commit_id  32 bytes
//!   body_len   u32, then body bytes
//!   obj_count  u32, then obj_count times:
//!     digest       32 bytes
//!     content_len  u32, then content bytes
//! ```

use thiserror::Error;

const MAGIC: &[u8; 4] = b"FPCK";

/// Version byte of the pack layout.
pub const PACK_FORMAT_VERSION: u8 = 1;

/// Errors produced while decoding a pack.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
    /// The input ended before the declared structure did.
    #[error("truncated pack")]
    Truncated,

    /// The input does not start with the pack magic.
    #[error("bad pack magic")]
    BadMagic,

    /// The pack was produced by an unknown format version.
    #[error("unsupported pack format version {version}")]
    UnsupportedVersion {
        /// The version byte found in the input.
        version: u8,
    },

    /// Bytes remained after the declared structure ended.
    #[error("trailing bytes after pack")]
    TrailingBytes,
}

/// One encrypted object carried alongside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackObject {
    /// Digest the receiver stores the object under, computed over the
    /// plaintext before encryption.
    pub digest: [u8; 32],
    /// Encrypted object content.
    pub content: Vec<u8>,
}

/// One commit and the objects shipped with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPackEntry {
    /// The page the commit belongs to.
    pub page_id: [u8; 16],
    /// Id the receiver verifies the decrypted body against.
    pub commit_id: [u8; 32],
    /// Encrypted commit body.
    pub body: Vec<u8>,
    /// Encrypted eager objects referenced by the commit.
    pub objects: Vec<PackObject>,
}

impl CommitPackEntry {
    /// Returns the exact number of bytes this entry adds to a pack.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let objects: usize = self
            .objects
            .iter()
            .map(|o| 32 + 4 + o.content.len())
            .sum();
        16 + 32 + 4 + self.body.len() + 4 + objects
    }
}

/// A batch of commits ready for one provider round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPack {
    /// Entries in upload order (parents before children).
    pub entries: Vec<CommitPackEntry>,
}

impl CommitPack {
    /// Creates an empty pack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the exact size of [`encode`](Self::encode)'s output.
    ///
    /// The engine uses this to cut packs at the configured upload size
    /// without encoding speculatively.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 1 + 4 + self.entries.iter().map(CommitPackEntry::encoded_len).sum::<usize>()
    }

    /// Encodes the pack.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(MAGIC);
        buf.push(PACK_FORMAT_VERSION);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.page_id);
            buf.extend_from_slice(&entry.commit_id);
            buf.extend_from_slice(&(entry.body.len() as u32).to_le_bytes());
            buf.extend_from_slice(&entry.body);
            buf.extend_from_slice(&(entry.objects.len() as u32).to_le_bytes());
            for object in &entry.objects {
                buf.extend_from_slice(&object.digest);
                buf.extend_from_slice(&(object.content.len() as u32).to_le_bytes());
                buf.extend_from_slice(&object.content);
            }
        }
        debug_assert_eq!(buf.len(), self.encoded_len());
        buf
    }

    /// Decodes a pack.
    ///
    /// # Errors
    ///
    /// Returns a [`PackError`] for a wrong magic, an unknown version,
    /// truncation, or trailing bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, PackError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        if cursor.take(4)? != MAGIC {
            return Err(PackError::BadMagic);
        }
        let version = cursor.take(1)?[0];
        if version != PACK_FORMAT_VERSION {
            return Err(PackError::UnsupportedVersion { version });
        }

        let count = cursor.take_u32()?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let mut page_id = [0u8; 16];
            page_id.copy_from_slice(cursor.take(16)?);
            let mut commit_id = [0u8; 32];
            commit_id.copy_from_slice(cursor.take(32)?);

            let body_len = cursor.take_u32()? as usize;
            let body = cursor.take(body_len)?.to_vec();

            let object_count = cursor.take_u32()?;
            let mut objects = Vec::new();
            for _ in 0..object_count {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(cursor.take(32)?);
                let content_len = cursor.take_u32()? as usize;
                objects.push(PackObject {
                    digest,
                    content: cursor.take(content_len)?.to_vec(),
                });
            }
            entries.push(CommitPackEntry {
                page_id,
                commit_id,
                body,
                objects,
            });
        }

        if cursor.pos != bytes.len() {
            return Err(PackError::TrailingBytes);
        }
        Ok(Self { entries })
    }

    /// Returns true if the pack carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], PackError> {
        let end = self.pos.checked_add(len).ok_or(PackError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(PackError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, PackError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_entry() -> CommitPackEntry {
        CommitPackEntry {
            page_id: [7; 16],
            commit_id: [9; 32],
            body: vec![1, 2, 3, 4],
            objects: vec![
                PackObject {
                    digest: [1; 32],
                    content: vec![0xaa; 10],
                },
                PackObject {
                    digest: [2; 32],
                    content: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn empty_pack_roundtrip() {
        let pack = CommitPack::new();
        let bytes = pack.encode();
        assert_eq!(bytes.len(), pack.encoded_len());
        assert_eq!(CommitPack::decode(&bytes).unwrap(), pack);
    }

    #[test]
    fn roundtrip_with_entries() {
        let pack = CommitPack {
            entries: vec![sample_entry(), sample_entry()],
        };
        let bytes = pack.encode();
        assert_eq!(bytes.len(), pack.encoded_len());
        assert_eq!(CommitPack::decode(&bytes).unwrap(), pack);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = CommitPack::new().encode();
        bytes[0] = b'X';
        assert_eq!(CommitPack::decode(&bytes), Err(PackError::BadMagic));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = CommitPack::new().encode();
        bytes[4] = 9;
        assert_eq!(
            CommitPack::decode(&bytes),
            Err(PackError::UnsupportedVersion { version: 9 })
        );
    }

    #[test]
    fn every_truncation_point_fails() {
        let pack = CommitPack {
            entries: vec![sample_entry()],
        };
        let bytes = pack.encode();
        for len in 0..bytes.len() {
            assert!(
                CommitPack::decode(&bytes[..len]).is_err(),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = CommitPack::new().encode();
        bytes.push(0);
        assert_eq!(CommitPack::decode(&bytes), Err(PackError::TrailingBytes));
    }

    proptest! {
        #[test]
        fn arbitrary_entries_roundtrip(
            bodies in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..5),
        ) {
            let entries: Vec<_> = bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| CommitPackEntry {
                    page_id: [i as u8; 16],
                    commit_id: [i as u8; 32],
                    body,
                    objects: vec![PackObject { digest: [i as u8; 32], content: vec![i as u8; i] }],
                })
                .collect();
            let pack = CommitPack { entries };
            let bytes = pack.encode();
            prop_assert_eq!(bytes.len(), pack.encoded_len());
            prop_assert_eq!(CommitPack::decode(&bytes).unwrap(), pack);
        }
    }
}
