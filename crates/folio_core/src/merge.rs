//! Merge conflict resolution.

use crate::commit::CommitId;
use crate::object::ObjectIdentifier;
use crate::types::KeyPriority;

/// One base commit's opinion about a conflicting key.
#[derive(Debug, Clone)]
pub struct ConflictCandidate {
    /// The base commit holding this candidate.
    pub commit: CommitId,
    /// Timestamp of that commit.
    pub timestamp: u64,
    /// The value under the key, or `None` if the key is absent in that base.
    pub value: Option<(ObjectIdentifier, KeyPriority)>,
}

/// Resolves a key that differs between the base commits of a merge.
///
/// Returning `None` deletes the key in the merge result.
pub trait ConflictResolver: Send + Sync {
    /// Picks the merged value for `key` from the candidates.
    fn resolve(
        &self,
        key: &[u8],
        candidates: &[ConflictCandidate],
    ) -> Option<(ObjectIdentifier, KeyPriority)>;
}

/// The default merge policy: last writer wins.
///
/// The candidate from the base commit with the latest timestamp wins; equal
/// timestamps are broken by the larger commit id so the outcome is
/// deterministic on every device.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl ConflictResolver for LastWriterWins {
    fn resolve(
        &self,
        _key: &[u8],
        candidates: &[ConflictCandidate],
    ) -> Option<(ObjectIdentifier, KeyPriority)> {
        candidates
            .iter()
            .max_by_key(|c| (c.timestamp, c.commit))
            .and_then(|winner| winner.value)
    }
}
