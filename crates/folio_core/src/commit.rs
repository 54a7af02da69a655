//! Immutable commit nodes of the page version DAG.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectIdentifier;
use sha2::{Digest, Sha256};
use std::fmt;

/// Version byte carried by every serialized commit.
///
/// Future layout changes bump this so old readers fail loudly instead of
/// misparsing.
pub const COMMIT_FORMAT_VERSION: u8 = 1;

/// Content-hash identifier of a commit.
///
/// The id is the SHA-256 of the commit's canonical encoding, so commits are
/// deduplicated and tamper-evident exactly like objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub [u8; 32]);

impl CommitId {
    /// Returns the raw id bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the id as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Creates an id from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommit`] if `bytes` is not 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_commit("commit id must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// An immutable node in a page's version DAG.
///
/// Zero parents only for the page's synthetic root commit, one parent for a
/// normal edit, two or more for a merge. Generation is the longest-path
/// depth from the root, used to order heads and walk ancestors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    id: CommitId,
    generation: u64,
    parents: Vec<CommitId>,
    timestamp: u64,
    root: ObjectIdentifier,
}

impl Commit {
    /// Builds the synthetic root commit of a page.
    #[must_use]
    pub fn page_root(root: ObjectIdentifier) -> Self {
        Self::build(Vec::new(), 0, 0, root)
    }

    /// Builds a normal edit commit on top of `parent`.
    ///
    /// The timestamp is clamped to the parent's so history never runs
    /// backwards on devices with skewed clocks.
    #[must_use]
    pub fn child_of(parent: &Commit, timestamp: u64, root: ObjectIdentifier) -> Self {
        Self::build(
            vec![parent.id],
            parent.generation + 1,
            timestamp.max(parent.timestamp),
            root,
        )
    }

    /// Builds a merge commit over two or more parents.
    ///
    /// Parents are ordered by id and the timestamp is the maximum of the
    /// parents' timestamps, so the resulting commit id does not depend on
    /// the order the heads were merged in.
    #[must_use]
    pub fn merge_of(parents: &[&Commit], root: ObjectIdentifier) -> Self {
        let mut ids: Vec<CommitId> = parents.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        let generation = parents.iter().map(|p| p.generation).max().unwrap_or(0) + 1;
        let timestamp = parents.iter().map(|p| p.timestamp).max().unwrap_or(0);
        Self::build(ids, generation, timestamp, root)
    }

    fn build(parents: Vec<CommitId>, generation: u64, timestamp: u64, root: ObjectIdentifier) -> Self {
        let mut commit = Self {
            id: CommitId([0u8; 32]),
            generation,
            parents,
            timestamp,
            root,
        };
        let encoded = commit.encode_body();
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        commit.id = CommitId(hasher.finalize().into());
        commit
    }

    /// Returns the commit id.
    #[must_use]
    pub fn id(&self) -> CommitId {
        self.id
    }

    /// Returns the generation number.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the parent commit ids.
    #[must_use]
    pub fn parents(&self) -> &[CommitId] {
        &self.parents
    }

    /// Returns the commit timestamp (microseconds since the epoch).
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the identifier of the page's root tree object.
    #[must_use]
    pub fn root(&self) -> ObjectIdentifier {
        self.root
    }

    /// Returns true if this is a page's synthetic root commit.
    #[must_use]
    pub fn is_page_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Encodes the commit body; the id is the SHA-256 of these bytes.
    #[must_use]
    pub fn encode_body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(COMMIT_FORMAT_VERSION);
        buf.extend_from_slice(&self.generation.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(self.parents.len() as u32).to_le_bytes());
        for parent in &self.parents {
            buf.extend_from_slice(parent.as_bytes());
        }
        buf.extend_from_slice(&self.root.encode());
        buf
    }

    /// Decodes a commit body, recomputing its id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommit`] on truncation or an unsupported
    /// format version.
    pub fn decode_body(bytes: &[u8]) -> CoreResult<Self> {
        let corrupt = |message: &str| CoreError::invalid_commit(message.to_string());

        let version = *bytes.first().ok_or_else(|| corrupt("empty commit body"))?;
        if version != COMMIT_FORMAT_VERSION {
            return Err(CoreError::invalid_commit(format!(
                "unsupported commit format version {version}"
            )));
        }
        let mut pos = 1usize;

        let generation = u64::from_le_bytes(
            bytes
                .get(pos..pos + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| corrupt("truncated commit body"))?,
        );
        pos += 8;
        let timestamp = u64::from_le_bytes(
            bytes
                .get(pos..pos + 8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| corrupt("truncated commit body"))?,
        );
        pos += 8;

        let parent_count = u32::from_le_bytes(
            bytes
                .get(pos..pos + 4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| corrupt("truncated commit body"))?,
        ) as usize;
        pos += 4;
        let mut parents = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            let id = CommitId::from_bytes(
                bytes
                    .get(pos..pos + 32)
                    .ok_or_else(|| corrupt("truncated commit body"))?,
            )?;
            parents.push(id);
            pos += 32;
        }

        let id_len = crate::object::id_encoded_len();
        let root = ObjectIdentifier::decode(
            bytes
                .get(pos..pos + id_len)
                .ok_or_else(|| corrupt("truncated commit body"))?,
        )?;
        pos += id_len;
        if pos != bytes.len() {
            return Err(corrupt("trailing bytes after commit body"));
        }

        Ok(Self::build(parents, generation, timestamp, root))
    }

    /// Decodes a commit body and verifies it hashes to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommit`] if the body does not match the
    /// id it was transferred under.
    pub fn decode_verified(bytes: &[u8], expected: CommitId) -> CoreResult<Self> {
        let commit = Self::decode_body(bytes)?;
        if commit.id != expected {
            return Err(CoreError::invalid_commit(format!(
                "commit body hashes to {} but was transferred as {}",
                commit.id, expected
            )));
        }
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_object() -> ObjectIdentifier {
        ObjectIdentifier::for_content(b"")
    }

    #[test]
    fn page_root_has_no_parents() {
        let commit = Commit::page_root(root_object());
        assert!(commit.is_page_root());
        assert_eq!(commit.generation(), 0);
        assert_eq!(commit.timestamp(), 0);
    }

    #[test]
    fn child_increments_generation() {
        let root = Commit::page_root(root_object());
        let child = Commit::child_of(&root, 1_000, root_object());
        assert_eq!(child.generation(), 1);
        assert_eq!(child.parents(), &[root.id()]);
    }

    #[test]
    fn child_timestamp_clamped_to_parent() {
        let root = Commit::page_root(root_object());
        let a = Commit::child_of(&root, 5_000, root_object());
        // Clock went backwards on this device.
        let b = Commit::child_of(&a, 3_000, root_object());
        assert_eq!(b.timestamp(), 5_000);
    }

    #[test]
    fn id_is_content_hash() {
        let root = Commit::page_root(root_object());
        let a = Commit::child_of(&root, 1_000, root_object());
        let b = Commit::child_of(&root, 1_000, root_object());
        let c = Commit::child_of(&root, 2_000, root_object());
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn merge_id_independent_of_parent_order() {
        let root = Commit::page_root(root_object());
        let b1 = Commit::child_of(&root, 1_000, root_object());
        let b2 = Commit::child_of(&root, 2_000, root_object());

        let m1 = Commit::merge_of(&[&b1, &b2], root_object());
        let m2 = Commit::merge_of(&[&b2, &b1], root_object());
        assert_eq!(m1.id(), m2.id());
        assert_eq!(m1.generation(), 2);
        assert_eq!(m1.timestamp(), 2_000);
    }

    #[test]
    fn wide_merge_roundtrips() {
        let root = Commit::page_root(root_object());
        let branches: Vec<Commit> = (0..300u64)
            .map(|i| Commit::child_of(&root, 1_000 + i, root_object()))
            .collect();
        let parents: Vec<&Commit> = branches.iter().collect();

        let merge = Commit::merge_of(&parents, root_object());
        assert_eq!(merge.parents().len(), 300);

        let decoded = Commit::decode_verified(&merge.encode_body(), merge.id()).unwrap();
        assert_eq!(decoded.parents().len(), 300);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let root = Commit::page_root(root_object());
        let commit = Commit::child_of(&root, 42, root_object());

        let decoded = Commit::decode_body(&commit.encode_body()).unwrap();
        assert_eq!(decoded, commit);
        assert_eq!(decoded.id(), commit.id());
    }

    #[test]
    fn decode_verified_detects_tampering() {
        let root = Commit::page_root(root_object());
        let commit = Commit::child_of(&root, 42, root_object());

        let mut body = commit.encode_body();
        let ts_offset = 9;
        body[ts_offset] ^= 0xff;

        assert!(matches!(
            Commit::decode_verified(&body, commit.id()),
            Err(CoreError::InvalidCommit { .. })
        ));
    }

    #[test]
    fn decode_unsupported_version_fails() {
        let root = Commit::page_root(root_object());
        let mut body = root.encode_body();
        body[0] = 99;
        assert!(Commit::decode_body(&body).is_err());
    }

    #[test]
    fn decode_truncated_fails() {
        let root = Commit::page_root(root_object());
        let body = root.encode_body();
        assert!(Commit::decode_body(&body[..body.len() - 1]).is_err());
    }
}
