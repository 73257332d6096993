use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{bounded, TrySendError};
use tracing::debug;

use crate::data_id::DataId;
use crate::storage::{RecordStore, StoreData};

use super::emitter::{ChangeSubscriber, Recomputed, SubscriptionId};
use super::stream::ObservationStream;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Compute<T> = Box<dyn Fn(&RecordStore) -> (T, HashSet<DataId>) + Send + Sync>;

/// Handle for a listener added to an `Observable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct ObservationState<T> {
    compute: Compute<T>,
    value: Mutex<T>,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_listener: AtomicU64,
    disposed: AtomicBool,
}

impl<T> ObservationState<T> {
    fn add_listener(&self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

impl<T> ChangeSubscriber for ObservationState<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn recompute(&self, records: &RecordStore) -> Recomputed {
        if self.disposed.load(Ordering::Acquire) {
            return Recomputed::default();
        }
        let (next, interest) = (self.compute)(records);
        let mut current = lock(&self.value);
        let changed = *current != next;
        if changed {
            *current = next;
        }
        Recomputed { interest, changed }
    }

    fn notify(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let value = lock(&self.value).clone();
        let listeners: Vec<Listener<T>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&value);
        }
    }
}

/// A live, recomputing view over part of the store.
///
/// The value is recomputed whenever a write batch touches one of the records
/// it was built from, and listeners are told once per batch if the value
/// changed. Dropping the observable disposes it.
pub struct Observable<T: Clone + PartialEq + Send + Sync + 'static> {
    state: Arc<ObservationState<T>>,
    data: Arc<StoreData>,
    subscription_id: SubscriptionId,
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Compute the initial value and register for changes.
    ///
    /// Registration happens under the same read lock as the initial compute,
    /// so no batch can slip in between.
    pub(crate) fn register<F>(data: Arc<StoreData>, compute: F) -> Self
    where
        F: Fn(&RecordStore) -> (T, HashSet<DataId>) + Send + Sync + 'static,
    {
        let subscription_id;
        let state;
        {
            let records = data.records();
            let (value, interest) = compute(&records);
            state = Arc::new(ObservationState {
                compute: Box::new(compute),
                value: Mutex::new(value),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
            });
            let subscriber: Arc<dyn ChangeSubscriber> = state.clone();
            subscription_id = data.emitter().subscribe(interest, subscriber);
        }
        debug!(subscription = ?subscription_id, "observation registered");

        Self {
            state,
            data,
            subscription_id,
        }
    }

    /// The most recently computed value.
    #[must_use]
    pub fn get_current_value(&self) -> T {
        lock(&self.state.value).clone()
    }

    /// Call `listener` with the new value after each batch that changes it.
    ///
    /// Listeners added after `dispose` are never called.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.state.add_listener(Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.remove_listener(id)
    }

    /// Receive changed values through a bounded channel.
    ///
    /// Values are dropped (and counted) instead of blocking the writer when
    /// the channel is full.
    #[must_use]
    pub fn subscribe_stream(&self, capacity: usize) -> ObservationStream<T> {
        let (tx, rx) = bounded::<T>(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let listener_dropped = Arc::clone(&dropped);
        let listener_id = self.add_listener(move |value: &T| match tx.try_send(value.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                listener_dropped.fetch_add(1, Ordering::Relaxed);
            }
        });
        ObservationStream::new(rx, listener_id, Arc::downgrade(&self.state), dropped)
    }

    /// Ids the observation currently depends on.
    #[must_use]
    pub fn interest(&self) -> HashSet<DataId> {
        self.data.emitter().interest_of(self.subscription_id).unwrap_or_default()
    }

    /// Registration id in the store's change emitter.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// True once `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }

    /// Stop observing. Idempotent.
    ///
    /// No listener is called after this returns, even for a batch already
    /// being broadcast.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.data.emitter().unsubscribe(self.subscription_id);
        lock(&self.state.listeners).clear();
        debug!(subscription = ?self.subscription_id, "observation disposed");
    }
}

impl<T> Drop for Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T> fmt::Debug for Observable<T>
where
    T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("subscription_id", &self.subscription_id)
            .field("value", &*lock(&self.state.value))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
