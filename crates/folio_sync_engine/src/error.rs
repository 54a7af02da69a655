//! Error types for the sync engine.

use folio_sync_protocol::CloudStatus;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The cloud provider reported a failure.
    #[error("provider error ({status}): {message}")]
    Provider {
        /// Status classification from the provider.
        status: CloudStatus,
        /// Description of the failure.
        message: String,
    },

    /// A received pack is malformed.
    #[error("pack error: {0}")]
    Pack(#[from] folio_sync_protocol::PackError),

    /// Storage error while applying or producing sync data.
    #[error("storage error: {0}")]
    Storage(#[from] folio_core::CoreError),

    /// A received object's plaintext does not hash to the digest it was
    /// shipped under.
    #[error("received object hashes to {actual}, shipped as {shipped}")]
    ObjectDigestMismatch {
        /// Digest declared in the pack.
        shipped: String,
        /// Digest of the decrypted bytes.
        actual: String,
    },

    /// The sync coroutine was canceled.
    #[error("sync canceled")]
    Canceled,
}

impl SyncError {
    /// Creates a provider error.
    pub fn provider(status: CloudStatus, message: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: message.into(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => status.is_retryable(),
            _ => false,
        }
    }
}
