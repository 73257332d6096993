use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{StoreError, StoreResult};

use super::observable::{ListenerId, ObservationState};

/// A channel of values produced by an `Observable`.
///
/// Dropping this stream removes its listener.
pub struct ObservationStream<T> {
    rx: Receiver<T>,
    listener_id: ListenerId,
    state: Weak<ObservationState<T>>,
    dropped: Arc<AtomicU64>,
    unsubscribed: AtomicBool,
}

impl<T> ObservationStream<T> {
    pub(crate) fn new(
        rx: Receiver<T>,
        listener_id: ListenerId,
        state: Weak<ObservationState<T>>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            rx,
            listener_id,
            state,
            dropped,
            unsubscribed: AtomicBool::new(false),
        }
    }

    /// Stop receiving values. Idempotent.
    ///
    /// Values already queued can still be received.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.remove_listener(self.listener_id);
        }
    }

    /// Receive the next value (blocking).
    pub fn recv(&self) -> StoreResult<T> {
        self.rx.recv().map_err(|_| StoreError::Disconnected {
            path: "observation_stream".to_string(),
        })
    }

    /// Receive the next value with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> StoreResult<T> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => StoreError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => StoreError::Disconnected {
                path: "observation_stream".to_string(),
            },
        })
    }

    /// Receive a queued value without blocking.
    pub fn try_recv(&self) -> StoreResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(StoreError::Disconnected {
                path: "observation_stream".to_string(),
            }),
        }
    }

    /// Values discarded because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Drop for ObservationStream<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> std::fmt::Debug for ObservationStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservationStream")
            .field("listener_id", &self.listener_id)
            .field("dropped", &self.dropped())
            .finish()
    }
}
