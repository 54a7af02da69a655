//! Tracing setup for tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a tracing subscriber honoring `RUST_LOG`, once per process.
///
/// Call at the top of a test to see storage and sync events while
/// debugging; repeated calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
