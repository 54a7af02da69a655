//! The per-page sync coordinator.
//!
//! The coordinator sits between page storage and the cloud provider. Local
//! commits reach it through the storage delegate and are queued, packed,
//! encrypted and uploaded; downloaded packs are decrypted, verified and
//! inserted back into storage. Divergent heads left behind by concurrent
//! devices are merged with the page's conflict policy.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::provider::CloudProvider;
use folio_core::{
    wait, CancelToken, Commit, CommitId, CoreError, EncryptionService, KeyPriority, Namespace,
    ObjectDigest, PageId, PageStorage, PageSyncDelegate,
};
use folio_sync_protocol::{CommitPack, CommitPackEntry, PackObject};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

/// Coordinates upload and download for one page.
pub struct SyncCoordinator {
    page: Arc<PageStorage>,
    namespace: Namespace,
    crypto: Arc<dyn EncryptionService>,
    provider: Arc<dyn CloudProvider>,
    config: SyncConfig,
    pending: Mutex<VecDeque<CommitId>>,
    cursor: Mutex<u64>,
    notify: Notify,
    cancel: CancelToken,
}

impl SyncCoordinator {
    /// Creates a coordinator and registers it as the page's sync delegate.
    pub fn new(
        page: Arc<PageStorage>,
        namespace: Namespace,
        crypto: Arc<dyn EncryptionService>,
        provider: Arc<dyn CloudProvider>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let cancel = page.cancel_token();
        let coordinator = Arc::new(Self {
            page: Arc::clone(&page),
            namespace,
            crypto,
            provider,
            config,
            pending: Mutex::new(VecDeque::new()),
            cursor: Mutex::new(0),
            notify: Notify::new(),
            cancel,
        });
        page.set_sync_delegate(Some(Arc::clone(&coordinator) as Arc<dyn PageSyncDelegate>));
        coordinator
    }

    /// Returns the number of commits queued for upload.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the provider log cursor of the next download.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        *self.cursor.lock()
    }

    /// Uploads every queued commit, batching into packs of at most the
    /// configured size.
    ///
    /// Commits leave the queue only after their pack is uploaded, so a
    /// failure retries from the first unshipped commit and the provider log
    /// stays parent-first.
    ///
    /// # Errors
    ///
    /// Propagates provider and storage failures; queued commits survive the
    /// error.
    pub fn flush_uploads(&self) -> SyncResult<usize> {
        let ids: Vec<CommitId> = self.pending.lock().iter().copied().collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut uploaded = 0usize;
        let mut pack = CommitPack::new();
        for id in &ids {
            let entry = self.build_entry(id)?;
            let oversize =
                pack.encoded_len() + entry.encoded_len() > self.config.max_pack_bytes;
            if !pack.is_empty() && oversize {
                self.upload_pack(&mut pack, &mut uploaded)?;
            }
            pack.entries.push(entry);
        }
        if !pack.is_empty() {
            self.upload_pack(&mut pack, &mut uploaded)?;
        }
        Ok(uploaded)
    }

    fn upload_pack(&self, pack: &mut CommitPack, uploaded: &mut usize) -> SyncResult<()> {
        let count = pack.entries.len();
        self.provider
            .upload_pack(&self.namespace, std::mem::take(pack).encode())?;
        let mut pending = self.pending.lock();
        for _ in 0..count {
            pending.pop_front();
        }
        drop(pending);
        *uploaded += count;
        tracing::debug!(page = %self.page.page_id(), commits = count, "pack uploaded");
        Ok(())
    }

    /// Builds the pack entry for one commit: the encrypted body plus the
    /// objects the commit introduced over its parents.
    fn build_entry(&self, id: &CommitId) -> SyncResult<CommitPackEntry> {
        let commit = self.page.get_commit(id)?;
        let body = self.crypto.encrypt(&self.namespace, &commit.encode_body())?;

        let mut inherited: HashSet<[u8; 32]> = HashSet::new();
        for parent in commit.parents() {
            for node in self.page.commit_tree_objects(parent)? {
                inherited.insert(node.digest.0);
            }
            for entry in self.page.snapshot(parent)? {
                inherited.insert(entry.value.digest.0);
            }
        }

        let mut objects = Vec::new();
        for node in self.page.commit_tree_objects(id)? {
            if inherited.contains(&node.digest.0) {
                continue;
            }
            let plain = self.page.objects().get_object(&node)?;
            objects.push(PackObject {
                digest: node.digest.0,
                content: self.crypto.encrypt(&self.namespace, &plain)?,
            });
        }
        for entry in self.page.snapshot(id)? {
            if inherited.contains(&entry.value.digest.0) {
                continue;
            }
            let plain = self.page.objects().get_object(&entry.value)?;
            let encrypted = self.crypto.encrypt(&self.namespace, &plain)?;
            match entry.priority {
                KeyPriority::Eager => objects.push(PackObject {
                    digest: entry.value.digest.0,
                    content: encrypted,
                }),
                // Lazy values go to standalone object storage; other
                // devices fetch them on first read.
                KeyPriority::Lazy => {
                    self.provider
                        .upload_object(&self.namespace, &entry.value.digest.0, encrypted)?;
                }
            }
        }

        Ok(CommitPackEntry {
            page_id: *self.page.page_id().as_bytes(),
            commit_id: commit.id().0,
            body,
            objects,
        })
    }

    /// Fetches and applies every pack the provider holds past the cursor.
    ///
    /// Returns the number of commits that were new to this device.
    ///
    /// # Errors
    ///
    /// Propagates provider, decryption and storage failures. The cursor
    /// only advances after every fetched pack applied, so a failed batch is
    /// refetched whole.
    pub fn download(&self) -> SyncResult<usize> {
        let cursor = self.cursor();
        let fetched = self.provider.fetch_packs(&self.namespace, cursor)?;
        let mut applied = 0usize;
        for pack in &fetched.packs {
            applied += self.receive_pack(pack)?;
        }
        *self.cursor.lock() = fetched.cursor;

        if applied > 0 {
            tracing::debug!(page = %self.page.page_id(), commits = applied, "remote commits applied");
            if self.config.auto_merge {
                self.merge_heads()?;
            }
        }
        Ok(applied)
    }

    /// Decrypts and applies one encoded pack.
    ///
    /// Idempotent: commits this device already holds count as applied zero
    /// times and change nothing.
    ///
    /// # Errors
    ///
    /// Returns a pack error for malformed input, an authentication error
    /// for ciphertext from a foreign namespace, and
    /// [`SyncError::ObjectDigestMismatch`] when a shipped object does not
    /// hash to its declared digest.
    pub fn receive_pack(&self, bytes: &[u8]) -> SyncResult<usize> {
        let pack = CommitPack::decode(bytes)?;
        let mut applied = 0usize;
        for entry in pack.entries {
            if entry.page_id != *self.page.page_id().as_bytes() {
                tracing::warn!(page = %self.page.page_id(), "skipping pack entry for foreign page");
                continue;
            }

            // Objects land before the commit that references them, so a
            // commit is never visible with its tree missing.
            for object in &entry.objects {
                let plain = self.crypto.decrypt(&self.namespace, &object.content)?;
                let actual = ObjectDigest::of(&plain);
                if actual.0 != object.digest {
                    return Err(SyncError::ObjectDigestMismatch {
                        shipped: ObjectDigest(object.digest).to_hex(),
                        actual: actual.to_hex(),
                    });
                }
                let stored = self.page.objects().store_object(&plain)?;
                self.page.objects().pin_object(&stored)?;
            }

            let body = self.crypto.decrypt(&self.namespace, &entry.body)?;
            let commit = Commit::decode_verified(&body, CommitId(entry.commit_id))?;
            if self.page.insert_remote_commit(commit)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Merges until the page has a single head.
    fn merge_heads(&self) -> SyncResult<()> {
        loop {
            let heads = self.page.get_heads()?;
            if heads.len() < 2 {
                return Ok(());
            }
            let ids: Vec<CommitId> = heads.iter().map(Commit::id).collect();
            let mut journal = self.page.new_merge_journal(&ids)?;
            let merge = self.page.commit_journal(&mut journal)?;
            tracing::info!(
                page = %self.page.page_id(),
                commit = %merge.id(),
                heads = ids.len(),
                "divergent heads merged"
            );
        }
    }

    /// Reads a value as of `commit`, downloading it from the provider if
    /// it was synced lazily and has not been fetched yet.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; a value neither local nor uploaded
    /// surfaces as a not-found provider error.
    pub fn fetch_value(&self, commit: &CommitId, key: &[u8]) -> SyncResult<Option<Vec<u8>>> {
        match self.page.get_value(commit, key) {
            Ok(value) => Ok(value),
            Err(CoreError::ObjectNotFound { .. }) => {
                let Some(entry) = self
                    .page
                    .snapshot(commit)?
                    .into_iter()
                    .find(|entry| entry.key == key)
                else {
                    return Ok(None);
                };
                let encrypted = self
                    .provider
                    .fetch_object(&self.namespace, &entry.value.digest.0)?;
                let plain = self.crypto.decrypt(&self.namespace, &encrypted)?;
                let actual = ObjectDigest::of(&plain);
                if actual != entry.value.digest {
                    return Err(SyncError::ObjectDigestMismatch {
                        shipped: entry.value.digest.to_hex(),
                        actual: actual.to_hex(),
                    });
                }
                let stored = self.page.objects().store_object(&plain)?;
                self.page.objects().pin_object(&stored)?;
                Ok(Some(plain))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// One full round trip: upload the queue, then apply new packs.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step; both steps are safe to rerun.
    pub fn sync_once(&self) -> SyncResult<()> {
        self.flush_uploads()?;
        self.download()?;
        Ok(())
    }

    /// Background sync coroutine.
    ///
    /// Wakes on local commits and on the poll interval, syncing with
    /// retry and backoff. Exits when the page is torn down.
    pub async fn run(self: Arc<Self>) {
        loop {
            let woken = wait(
                &self.cancel,
                tokio::time::timeout(self.config.poll_interval, self.notify.notified()),
            )
            .await;
            if woken.is_interrupted() {
                break;
            }
            self.sync_with_retry().await;
        }
        tracing::debug!(page = %self.page.page_id(), "sync loop stopped");
    }

    async fn sync_with_retry(&self) {
        for attempt in 0..self.config.retry.max_attempts {
            let delay = self.config.retry.delay_for_attempt(attempt);
            if !delay.is_zero() && wait(&self.cancel, tokio::time::sleep(delay)).await.is_interrupted()
            {
                return;
            }
            match self.sync_once() {
                Ok(()) => return,
                Err(err) if err.is_retryable() => {
                    tracing::warn!(%err, attempt, "sync attempt failed, will retry");
                }
                Err(err) => {
                    tracing::error!(%err, "sync failed");
                    return;
                }
            }
        }
    }
}

impl PageSyncDelegate for SyncCoordinator {
    fn on_local_commit(&self, _page: &PageId, commit: &Commit) {
        self.pending.lock().push_back(commit.id());
        self.notify.notify_one();
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("page", &self.page.page_id())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
