//! Change emitter.
//!
//! Owns every live subscription with the set of ids it is interested in.
//! `StoreData` asks it which subscriptions a batch affects and feeds back the
//! interest set each one recomputed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data_id::DataId;
use crate::storage::RecordStore;

/// Unique identifier for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of recomputing one subscription after a batch.
#[derive(Debug, Default)]
pub(crate) struct Recomputed {
    /// Ids the subscription depends on after this recompute.
    pub interest: HashSet<DataId>,
    /// Whether listeners must be notified.
    pub changed: bool,
}

/// A subscription as seen by the emitter.
pub(crate) trait ChangeSubscriber: Send + Sync {
    /// Re-read the subscribed data. Called with the read lock held.
    fn recompute(&self, records: &RecordStore) -> Recomputed;

    /// Deliver the current value to listeners. Called with no lock held.
    fn notify(&self);
}

struct Registration {
    interest: HashSet<DataId>,
    subscriber: Arc<dyn ChangeSubscriber>,
}

/// Registry of live subscriptions keyed by their interest sets.
#[derive(Default)]
pub struct ChangeEmitter {
    subscriptions: Mutex<HashMap<SubscriptionId, Registration>>,
}

impl ChangeEmitter {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Registration>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(
        &self,
        interest: HashSet<DataId>,
        subscriber: Arc<dyn ChangeSubscriber>,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.lock().insert(id, Registration { interest, subscriber });
        id
    }

    /// Remove a subscription. Returns false if it was already removed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Subscriptions whose interest intersects `touched`, each listed once.
    pub(crate) fn affected(
        &self,
        touched: &HashSet<DataId>,
    ) -> Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)> {
        self.lock()
            .iter()
            .filter(|(_, reg)| !reg.interest.is_disjoint(touched))
            .map(|(id, reg)| (*id, Arc::clone(&reg.subscriber)))
            .collect()
    }

    /// Replace the interest set of a subscription that is still registered.
    pub(crate) fn update_interest(&self, id: SubscriptionId, interest: HashSet<DataId>) {
        if let Some(reg) = self.lock().get_mut(&id) {
            reg.interest = interest;
        }
    }

    /// Current interest set of a subscription.
    #[must_use]
    pub fn interest_of(&self, id: SubscriptionId) -> Option<HashSet<DataId>> {
        self.lock().get(&id).map(|reg| reg.interest.clone())
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock().len()
    }
}

impl fmt::Debug for ChangeEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
