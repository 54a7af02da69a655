//! Paired synced devices over an in-memory cloud.

use crate::fixtures::TestPage;
use folio_core::{MasterKey, Namespace, NamespaceCrypto};
use folio_sync_engine::{CloudProvider, MemoryCloudProvider, SyncConfig, SyncCoordinator};
use std::sync::Arc;

/// One device in a sync scenario.
pub struct SyncedDevice {
    /// The device's page.
    pub page: TestPage,
    /// The device's coordinator.
    pub sync: Arc<SyncCoordinator>,
}

/// A set of devices sharing one cloud provider and one master key.
pub struct SyncFixture {
    /// The shared provider.
    pub provider: Arc<MemoryCloudProvider>,
    /// The devices, all opened on the same logical page.
    pub devices: Vec<SyncedDevice>,
}

impl SyncFixture {
    /// Creates `count` freshly bootstrapped devices for one shared page.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let provider = Arc::new(MemoryCloudProvider::new());
        let key = MasterKey::generate();
        let devices = (0..count)
            .map(|_| {
                let page = TestPage::memory();
                let sync = SyncCoordinator::new(
                    Arc::clone(&page.page),
                    Namespace::new("testkit-page"),
                    Arc::new(NamespaceCrypto::new(key.clone())),
                    Arc::clone(&provider) as Arc<dyn CloudProvider>,
                    SyncConfig::default(),
                );
                SyncedDevice { page, sync }
            })
            .collect();
        Self { provider, devices }
    }

    /// Runs sync rounds until every device stops seeing new data.
    ///
    /// Panics if the devices fail to settle, which in practice means a
    /// convergence bug.
    pub fn settle(&self) {
        for _ in 0..8 {
            let mut quiet = true;
            for device in &self.devices {
                device.sync.flush_uploads().expect("upload should succeed");
                if device.sync.download().expect("download should succeed") > 0 {
                    quiet = false;
                }
            }
            if quiet && self.devices.iter().all(|d| d.sync.pending_uploads() == 0) {
                return;
            }
        }
        panic!("devices did not settle");
    }
}
