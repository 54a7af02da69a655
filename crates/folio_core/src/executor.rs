//! Cooperative coroutine executor.
//!
//! Storage-internal logic runs on a single logical thread: coroutines
//! suspend at explicit await points (Db I/O, network I/O, another
//! coroutine) and never run concurrently with each other, so in-memory
//! structures shared only within storage need no locking.
//!
//! Cancellation is a result, not an exception: a coroutine canceled while
//! waiting observes [`WaitResult::Interrupted`], meaning the awaited
//! operation did not complete and no state was changed.

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, LocalSet};

/// Outcome of a cancellable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult<T> {
    /// The awaited operation completed.
    Completed(T),
    /// The coroutine was canceled while waiting; the operation did not
    /// complete and state is unchanged.
    Interrupted,
}

impl<T> WaitResult<T> {
    /// Returns true if the wait was interrupted.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Converts the result, mapping interruption to
    /// [`CoreError::Interrupted`](crate::CoreError::Interrupted).
    pub fn into_result(self) -> crate::CoreResult<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Interrupted => Err(crate::CoreError::Interrupted),
        }
    }
}

/// A cloneable cancellation flag shared between a resource owner and the
/// coroutines operating on it.
///
/// Tearing down a page cancels its token; every coroutine waiting through
/// [`wait`] on that token resumes with [`WaitResult::Interrupted`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    canceled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a fresh, uncanceled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token, waking every waiter.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true if the token has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is canceled.
    pub async fn canceled(&self) {
        if self.is_canceled() {
            return;
        }
        let mut notified = pin!(self.inner.notify.notified());
        notified.as_mut().enable();
        // Re-check after registering so a cancel between the first check
        // and registration is not missed.
        if self.is_canceled() {
            return;
        }
        notified.await;
    }
}

/// Suspends until `awaitable` completes or `token` is canceled, whichever
/// comes first.
pub async fn wait<F: Future>(token: &CancelToken, awaitable: F) -> WaitResult<F::Output> {
    tokio::select! {
        biased;
        () = token.canceled() => WaitResult::Interrupted,
        output = awaitable => WaitResult::Completed(output),
    }
}

/// Handle to a started coroutine.
#[derive(Debug)]
pub struct CoroutineHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> CoroutineHandle<T> {
    /// Waits for the coroutine to finish.
    ///
    /// Returns [`WaitResult::Interrupted`] if the coroutine was canceled
    /// before completing.
    pub async fn join(self) -> WaitResult<T> {
        match self.inner.await {
            Ok(value) => WaitResult::Completed(value),
            Err(_) => WaitResult::Interrupted,
        }
    }

    /// Cancels the coroutine at its next suspension point.
    pub fn cancel(&self) {
        self.inner.abort();
    }
}

/// A single-logical-thread cooperative scheduler.
///
/// All coroutines run interleaved on one thread; only one coroutine's code
/// executes at any moment.
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    local: LocalSet,
}

impl Executor {
    /// Creates a new executor.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the underlying runtime cannot be built.
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self {
            runtime,
            local: LocalSet::new(),
        })
    }

    /// Schedules a new coroutine.
    ///
    /// The coroutine starts running once the executor is driven by
    /// [`run_until`](Self::run_until).
    pub fn start_coroutine<F>(&self, body: F) -> CoroutineHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        CoroutineHandle {
            inner: self.local.spawn_local(body),
        }
    }

    /// Drives the scheduler until `main` completes, interleaving all
    /// started coroutines.
    pub fn run_until<F: Future>(&self, main: F) -> F::Output {
        self.local.block_on(&self.runtime, main)
    }
}
