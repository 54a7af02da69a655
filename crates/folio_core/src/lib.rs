//! # FolioDB Core
//!
//! Versioned, content-addressed, encrypted page storage engine.
//!
//! This crate provides:
//! - A content-addressed object store with deduplication and reference
//!   counting, layered on a [`folio_db::Db`]
//! - The commit DAG: immutable, content-addressed version nodes per page
//! - Journal transactions that stage key mutations and produce new commits
//! - A structural-sharing page tree so commits share unchanged subtrees
//! - A per-namespace encryption boundary for data leaving the device
//! - A cooperative coroutine executor for sequencing storage operations
//!
//! A page is an independently versioned key-value store. Every mutation
//! becomes an immutable commit; divergent histories (local edits racing
//! remote ones) appear as multiple heads and are reconciled by a merge
//! commit with a deterministic policy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commit;
mod crypto;
mod error;
mod executor;
mod journal;
mod merge;
mod object;
mod page;
mod tree;
mod types;

pub use commit::{Commit, CommitId, COMMIT_FORMAT_VERSION};
pub use crypto::{
    EncryptionService, MasterKey, NamespaceCrypto, PlaintextCrypto, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CoreError, CoreResult};
pub use executor::{wait, CancelToken, CoroutineHandle, Executor, WaitResult};
pub use journal::{Journal, JournalOp, JournalState};
pub use merge::{ConflictCandidate, ConflictResolver, LastWriterWins};
pub use object::{ObjectDigest, ObjectIdentifier, ObjectStore, ObjectStoreConfig};
pub use page::{AncestorIter, PageStorage, PageSyncDelegate, SnapshotEntry};
pub use types::{JournalId, KeyPriority, Namespace, PageId};
