//! Query runner: fetch orchestration.
//!
//! `run` (prime) fetches only what the store cannot answer yet; `force_fetch`
//! refetches whole queries. Both return a `FetchHandle` whose disposal aborts
//! delivery to that caller only.

pub mod diff;
mod pending;
pub mod writer;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreError;
use crate::query::QuerySet;

pub use pending::PendingQueryRunner;

/// Final outcome reported to a fetch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// All requested data is in the store.
    Success,
    /// A fetch failed; the store was not modified for it.
    Failure(StoreError),
    /// The caller disposed its handle before the fetch settled.
    Aborted,
}

impl FetchStatus {
    /// True for `Success`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// True for `Failure`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// True for `Aborted`.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Callback receiving the outcome of `run` / `force_fetch`.
pub type FetchCallback = Arc<dyn Fn(FetchStatus) + Send + Sync>;

type Disposer = Box<dyn FnOnce() + Send>;

/// Disposable handle for a fetch request.
///
/// Dropping the handle does not dispose it.
pub struct FetchHandle {
    disposer: Mutex<Option<Disposer>>,
}

impl FetchHandle {
    /// Handle that runs `disposer` on the first `dispose`.
    pub fn new<F>(disposer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            disposer: Mutex::new(Some(Box::new(disposer))),
        }
    }

    /// Handle with nothing to dispose.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            disposer: Mutex::new(None),
        }
    }

    /// Abort delivery to this caller. Idempotent.
    pub fn dispose(&self) {
        let disposer = self.disposer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(disposer) = disposer {
            disposer();
        }
    }

    /// True once `dispose` has been called or the handle had nothing to dispose.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposer.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

impl fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchHandle")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Fetch orchestration used by the `GraphStore` facade.
pub trait QueryRunner: Send + Sync {
    /// Fetch whatever part of `queries` the store cannot satisfy.
    fn run(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle;

    /// Fetch all of `queries` regardless of what is cached.
    fn force_fetch(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle;
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Attach prime requests to in-flight fetches that cover them.
    pub dedupe_in_flight: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            dedupe_in_flight: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handle_disposes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handle = FetchHandle::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!handle.is_disposed());
        handle.dispose();
        handle.dispose();
        assert!(handle.is_disposed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_handle() {
        let handle = FetchHandle::noop();
        handle.dispose();
        assert!(handle.is_disposed());
    }
}
