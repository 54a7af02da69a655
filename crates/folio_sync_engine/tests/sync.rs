//! End-to-end sync between devices sharing a cloud provider.

use folio_core::{
    CoreError, Executor, KeyPriority, MasterKey, Namespace, NamespaceCrypto, ObjectStoreConfig,
    PageId, PageStorage,
};
use folio_db::MemoryDb;
use folio_sync_engine::{MemoryCloudProvider, SyncConfig, SyncCoordinator, SyncError};
use std::sync::Arc;

struct Device {
    page: Arc<PageStorage>,
    sync: Arc<SyncCoordinator>,
}

fn device(
    provider: &Arc<MemoryCloudProvider>,
    key: &MasterKey,
    config: SyncConfig,
) -> Device {
    let page = Arc::new(
        PageStorage::open(
            Arc::new(MemoryDb::new()),
            PageId::new([1; 16]),
            ObjectStoreConfig::default(),
        )
        .unwrap(),
    );
    let sync = SyncCoordinator::new(
        Arc::clone(&page),
        Namespace::new("shared-page"),
        Arc::new(NamespaceCrypto::new(key.clone())),
        Arc::clone(provider) as Arc<dyn folio_sync_engine::CloudProvider>,
        config,
    );
    Device { page, sync }
}

fn commit_put(device: &Device, key: &[u8], value: &[u8]) {
    commit_put_priority(device, key, value, KeyPriority::Eager);
}

fn commit_put_priority(device: &Device, key: &[u8], value: &[u8], priority: KeyPriority) {
    let head = device.page.get_heads().unwrap().pop().unwrap();
    let id = device.page.store_value(value).unwrap();
    let mut journal = device.page.new_journal(&head.id()).unwrap();
    journal.put(key.to_vec(), id, priority).unwrap();
    device.page.commit_journal(&mut journal).unwrap();
}

fn head_id(device: &Device) -> folio_core::CommitId {
    let heads = device.page.get_heads().unwrap();
    assert_eq!(heads.len(), 1, "device should have converged to one head");
    heads[0].id()
}

#[test]
fn commit_travels_between_devices() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let a = device(&provider, &key, SyncConfig::default());
    let b = device(&provider, &key, SyncConfig::default());

    commit_put(&a, b"title", b"hello from a");
    a.sync.sync_once().unwrap();
    b.sync.sync_once().unwrap();

    let head = head_id(&b);
    assert_eq!(head, head_id(&a));
    assert_eq!(
        b.page.get_value(&head, b"title").unwrap().unwrap(),
        b"hello from a"
    );
}

#[test]
fn concurrent_edits_converge_to_identical_merge() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let a = device(&provider, &key, SyncConfig::default());
    let b = device(&provider, &key, SyncConfig::default());

    commit_put(&a, b"from-a", b"1");
    commit_put(&b, b"from-b", b"2");

    // Each round uploads what the previous round produced (including the
    // merge commits), so a few rounds reach a fixpoint.
    for _ in 0..4 {
        a.sync.sync_once().unwrap();
        b.sync.sync_once().unwrap();
    }

    let head = head_id(&a);
    assert_eq!(head, head_id(&b));
    assert_eq!(a.page.get_value(&head, b"from-a").unwrap().unwrap(), b"1");
    assert_eq!(a.page.get_value(&head, b"from-b").unwrap().unwrap(), b"2");
    assert_eq!(b.page.get_value(&head, b"from-a").unwrap().unwrap(), b"1");
}

#[test]
fn conflicting_edits_resolve_identically_on_both_devices() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let a = device(&provider, &key, SyncConfig::default());
    let b = device(&provider, &key, SyncConfig::default());

    commit_put(&a, b"color", b"red");
    commit_put(&b, b"color", b"blue");

    for _ in 0..4 {
        a.sync.sync_once().unwrap();
        b.sync.sync_once().unwrap();
    }

    let head = head_id(&a);
    assert_eq!(head, head_id(&b));
    let winner_a = a.page.get_value(&head, b"color").unwrap().unwrap();
    let winner_b = b.page.get_value(&head, b"color").unwrap().unwrap();
    assert_eq!(winner_a, winner_b);
    assert!(winner_a == b"red" || winner_a == b"blue");
}

#[test]
fn wrong_key_cannot_read_the_log() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let a = device(&provider, &MasterKey::generate(), SyncConfig::default());
    let b = device(&provider, &MasterKey::generate(), SyncConfig::default());

    commit_put(&a, b"secret", b"payload");
    a.sync.sync_once().unwrap();

    let err = b.sync.download().unwrap_err();
    assert!(matches!(
        err,
        SyncError::Storage(CoreError::AuthenticationFailure { .. })
    ));
}

#[test]
fn network_failure_keeps_the_queue() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let a = device(&provider, &key, SyncConfig::default());

    commit_put(&a, b"k", b"v");
    provider.set_network_down(true);

    let err = a.sync.flush_uploads().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(a.sync.pending_uploads(), 1);

    provider.set_network_down(false);
    assert_eq!(a.sync.flush_uploads().unwrap(), 1);
    assert_eq!(a.sync.pending_uploads(), 0);
}

#[test]
fn small_pack_limit_splits_uploads() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let namespace = Namespace::new("shared-page");
    let a = device(
        &provider,
        &key,
        SyncConfig::default().with_max_pack_bytes(256),
    );
    let b = device(&provider, &key, SyncConfig::default());

    for i in 0..5u8 {
        commit_put(&a, &[b'k', i], &[i]);
    }
    a.sync.flush_uploads().unwrap();
    assert!(provider.pack_count(&namespace) > 1);

    b.sync.sync_once().unwrap();
    assert_eq!(head_id(&b), head_id(&a));
}

#[test]
fn lazy_values_download_on_first_read() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let a = device(&provider, &key, SyncConfig::default());
    let b = device(&provider, &key, SyncConfig::default());

    commit_put_priority(&a, b"attachment", b"big blob", KeyPriority::Lazy);
    a.sync.sync_once().unwrap();
    b.sync.sync_once().unwrap();

    let head = head_id(&b);
    // The commit arrived but the lazy value body did not.
    assert!(matches!(
        b.page.get_value(&head, b"attachment"),
        Err(CoreError::ObjectNotFound { .. })
    ));

    let fetched = b.sync.fetch_value(&head, b"attachment").unwrap().unwrap();
    assert_eq!(fetched, b"big blob");
    // Second read is local.
    assert_eq!(
        b.page.get_value(&head, b"attachment").unwrap().unwrap(),
        b"big blob"
    );
}

#[test]
fn background_loop_uploads_and_stops_on_teardown() {
    let provider = Arc::new(MemoryCloudProvider::new());
    let key = MasterKey::generate();
    let namespace = Namespace::new("shared-page");
    let a = device(&provider, &key, SyncConfig::default());

    let executor = Executor::new().unwrap();
    let handle = executor.start_coroutine(Arc::clone(&a.sync).run());

    commit_put(&a, b"k", b"v");
    executor.run_until(async {
        // Let the loop observe the queued commit.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.pack_count(&namespace), 1);

        a.page.tear_down();
        assert!(!handle.join().await.is_interrupted());
    });
}
