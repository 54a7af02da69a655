//! Error types for FolioDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core storage operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Db layer error.
    #[error("db error: {0}")]
    Db(#[from] folio_db::DbError),

    /// A requested object is not stored.
    #[error("object not found: {digest}")]
    ObjectNotFound {
        /// Hex digest of the missing object.
        digest: String,
    },

    /// A requested commit is not in the graph.
    #[error("commit not found: {id}")]
    CommitNotFound {
        /// Hex id of the missing commit.
        id: String,
    },

    /// Stored object content does not match its digest.
    ///
    /// Non-retryable integrity failure.
    #[error("corrupt object: expected digest {expected}, got {actual}")]
    CorruptObject {
        /// The digest the object was stored under.
        expected: String,
        /// The digest of the bytes actually read.
        actual: String,
    },

    /// A stored or received commit is malformed.
    #[error("invalid commit: {message}")]
    InvalidCommit {
        /// Description of the problem.
        message: String,
    },

    /// A commit arrived before one of its parents.
    #[error("missing parent commit: {id}")]
    MissingParent {
        /// Hex id of the unknown parent.
        id: String,
    },

    /// Decryption failed authentication.
    ///
    /// Non-retryable; the ciphertext was produced under a different
    /// namespace key or has been tampered with.
    #[error("authentication failure decrypting for namespace {namespace}")]
    AuthenticationFailure {
        /// The namespace the decryption was attempted under.
        namespace: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Invalid key material size.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// The journal has already been committed or rolled back.
    #[error("journal already finalized")]
    JournalFinalized,

    /// A journal was created without any base commit.
    #[error("journal has no base commit")]
    NoBaseCommit,

    /// A coroutine was canceled while waiting.
    ///
    /// The operation did not complete and no state was changed.
    #[error("operation interrupted")]
    Interrupted,
}

impl CoreError {
    /// Creates an object-not-found error.
    pub fn object_not_found(digest: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            digest: digest.into(),
        }
    }

    /// Creates a commit-not-found error.
    pub fn commit_not_found(id: impl Into<String>) -> Self {
        Self::CommitNotFound { id: id.into() }
    }

    /// Creates an invalid commit error.
    pub fn invalid_commit(message: impl Into<String>) -> Self {
        Self::InvalidCommit {
            message: message.into(),
        }
    }

    /// Creates an encryption failure error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Returns true if the error is a non-retryable integrity or
    /// authentication failure.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::CorruptObject { .. } | Self::AuthenticationFailure { .. }
        )
    }
}
