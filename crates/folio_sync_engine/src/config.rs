//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a page's sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on an uploaded pack's encoded size.
    ///
    /// A single oversized commit still ships alone; the bound caps
    /// batching, it never blocks progress.
    pub max_pack_bytes: usize,
    /// Automatically merge divergent heads after applying remote commits.
    pub auto_merge: bool,
    /// Retry configuration for provider calls.
    pub retry: RetryConfig,
    /// How often the background loop polls the provider for new packs.
    pub poll_interval: Duration,
}

impl SyncConfig {
    /// Sets the maximum encoded pack size.
    #[must_use]
    pub fn with_max_pack_bytes(mut self, bytes: usize) -> Self {
        self.max_pack_bytes = bytes;
        self
    }

    /// Enables or disables automatic merging of divergent heads.
    #[must_use]
    pub fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the provider poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pack_bytes: 1024 * 1024,
            auto_merge: true,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per operation.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries.
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt limit.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }

    /// Creates a configuration that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Returns the backoff delay before the given attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        (self.initial_delay * factor).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
