//! Cloud provider abstraction.
//!
//! The provider is a dumb, ordered pack log plus an object store, both
//! keyed by namespace. It never sees plaintext; everything it holds was
//! encrypted by the device that uploaded it.

use crate::error::{SyncError, SyncResult};
use folio_core::Namespace;
use folio_sync_protocol::CloudStatus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Packs fetched from the provider log.
#[derive(Debug, Clone, Default)]
pub struct FetchedPacks {
    /// Encoded packs in log order.
    pub packs: Vec<Vec<u8>>,
    /// Cursor to resume from on the next fetch.
    pub cursor: u64,
}

/// Transport to the cloud, abstracted so tests and deployments differ only
/// in the implementation behind this trait.
///
/// Packs for a namespace form an append-only ordered log; a device that
/// fetches from its last cursor sees every pack it has not applied yet,
/// exactly once, in upload order.
pub trait CloudProvider: Send + Sync {
    /// Appends an encoded pack to the namespace's log.
    fn upload_pack(&self, namespace: &Namespace, pack: Vec<u8>) -> SyncResult<()>;

    /// Returns the packs appended at or after `cursor`.
    fn fetch_packs(&self, namespace: &Namespace, cursor: u64) -> SyncResult<FetchedPacks>;

    /// Stores a standalone encrypted object, keyed by its plaintext digest.
    fn upload_object(
        &self,
        namespace: &Namespace,
        digest: &[u8; 32],
        content: Vec<u8>,
    ) -> SyncResult<()>;

    /// Fetches a standalone encrypted object.
    ///
    /// # Errors
    ///
    /// Returns a [`CloudStatus::NotFound`] provider error if no device has
    /// uploaded the object yet.
    fn fetch_object(&self, namespace: &Namespace, digest: &[u8; 32]) -> SyncResult<Vec<u8>>;
}

#[derive(Default)]
struct MemoryCloudState {
    logs: HashMap<String, Vec<Vec<u8>>>,
    objects: HashMap<(String, [u8; 32]), Vec<u8>>,
}

/// In-memory [`CloudProvider`] for tests.
///
/// Several coordinators sharing one instance behave like devices sharing a
/// cloud account. Network failures can be injected to exercise retry
/// paths.
#[derive(Default)]
pub struct MemoryCloudProvider {
    state: Mutex<MemoryCloudState>,
    network_down: AtomicBool,
}

impl MemoryCloudProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing or regaining connectivity.
    pub fn set_network_down(&self, down: bool) {
        self.network_down.store(down, Ordering::SeqCst);
    }

    /// Returns the number of packs uploaded for `namespace`.
    #[must_use]
    pub fn pack_count(&self, namespace: &Namespace) -> usize {
        self.state
            .lock()
            .logs
            .get(namespace.as_str())
            .map_or(0, Vec::len)
    }

    fn check_network(&self) -> SyncResult<()> {
        if self.network_down.load(Ordering::SeqCst) {
            return Err(SyncError::provider(
                CloudStatus::NetworkError,
                "network unreachable",
            ));
        }
        Ok(())
    }
}

impl CloudProvider for MemoryCloudProvider {
    fn upload_pack(&self, namespace: &Namespace, pack: Vec<u8>) -> SyncResult<()> {
        self.check_network()?;
        self.state
            .lock()
            .logs
            .entry(namespace.as_str().to_owned())
            .or_default()
            .push(pack);
        Ok(())
    }

    fn fetch_packs(&self, namespace: &Namespace, cursor: u64) -> SyncResult<FetchedPacks> {
        self.check_network()?;
        let state = self.state.lock();
        let log = state.logs.get(namespace.as_str());
        let packs: Vec<Vec<u8>> = log
            .map(|log| log.iter().skip(cursor as usize).cloned().collect())
            .unwrap_or_default();
        let cursor = cursor + packs.len() as u64;
        Ok(FetchedPacks { packs, cursor })
    }

    fn upload_object(
        &self,
        namespace: &Namespace,
        digest: &[u8; 32],
        content: Vec<u8>,
    ) -> SyncResult<()> {
        self.check_network()?;
        self.state
            .lock()
            .objects
            .insert((namespace.as_str().to_owned(), *digest), content);
        Ok(())
    }

    fn fetch_object(&self, namespace: &Namespace, digest: &[u8; 32]) -> SyncResult<Vec<u8>> {
        self.check_network()?;
        self.state
            .lock()
            .objects
            .get(&(namespace.as_str().to_owned(), *digest))
            .cloned()
            .ok_or_else(|| SyncError::provider(CloudStatus::NotFound, "object not uploaded"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace::new("test")
    }

    #[test]
    fn pack_log_preserves_order_and_cursor() {
        let provider = MemoryCloudProvider::new();
        provider.upload_pack(&ns(), vec![1]).unwrap();
        provider.upload_pack(&ns(), vec![2]).unwrap();

        let fetched = provider.fetch_packs(&ns(), 0).unwrap();
        assert_eq!(fetched.packs, vec![vec![1], vec![2]]);
        assert_eq!(fetched.cursor, 2);

        provider.upload_pack(&ns(), vec![3]).unwrap();
        let fetched = provider.fetch_packs(&ns(), fetched.cursor).unwrap();
        assert_eq!(fetched.packs, vec![vec![3]]);
        assert_eq!(fetched.cursor, 3);
    }

    #[test]
    fn namespaces_are_isolated() {
        let provider = MemoryCloudProvider::new();
        provider.upload_pack(&Namespace::new("a"), vec![1]).unwrap();
        assert!(provider
            .fetch_packs(&Namespace::new("b"), 0)
            .unwrap()
            .packs
            .is_empty());
    }

    #[test]
    fn network_failure_is_retryable() {
        let provider = MemoryCloudProvider::new();
        provider.set_network_down(true);
        let err = provider.upload_pack(&ns(), vec![1]).unwrap_err();
        assert!(err.is_retryable());

        provider.set_network_down(false);
        provider.upload_pack(&ns(), vec![1]).unwrap();
        assert_eq!(provider.pack_count(&ns()), 1);
    }

    #[test]
    fn missing_object_is_not_found() {
        let provider = MemoryCloudProvider::new();
        let err = provider.fetch_object(&ns(), &[0; 32]).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Provider {
                status: CloudStatus::NotFound,
                ..
            }
        ));

        provider.upload_object(&ns(), &[0; 32], vec![9]).unwrap();
        assert_eq!(provider.fetch_object(&ns(), &[0; 32]).unwrap(), vec![9]);
    }
}
