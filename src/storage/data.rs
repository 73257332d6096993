//! Shared store state: the record arena plus the change emitter.
//!
//! Every write goes through `StoreData::write_batch`. The batch records which
//! ids actually changed; once the write lock is released, affected
//! subscriptions recompute and are notified at most once for the batch.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use tracing::trace;

use crate::data_id::DataId;
use crate::observe::ChangeEmitter;
use crate::value::FieldValue;

use super::records::{RecordState, RecordStore, StoreSnapshot};

/// Mutable view of the record store for the duration of one batch.
#[derive(Debug)]
pub struct WriteBatch<'a> {
    records: &'a mut RecordStore,
    touched: HashSet<DataId>,
}

impl<'a> WriteBatch<'a> {
    fn new(records: &'a mut RecordStore) -> Self {
        Self {
            records,
            touched: HashSet::new(),
        }
    }

    /// Read access to the store as modified so far.
    #[must_use]
    pub fn records(&self) -> &RecordStore {
        self.records
    }

    /// Read one field as of the writes made so far.
    #[must_use]
    pub fn get_field(&self, id: &DataId, storage_key: &str) -> Option<&FieldValue> {
        self.records.get_field(id, storage_key)
    }

    /// Record state as of the writes made so far.
    #[must_use]
    pub fn get_record_state(&self, id: &DataId) -> RecordState {
        self.records.get_record_state(id)
    }

    /// Write one field. Marks the record touched only if the value changed.
    pub fn put_field(&mut self, id: &DataId, storage_key: &str, value: FieldValue) {
        if self.records.put_field(id, storage_key, value) {
            self.touched.insert(id.clone());
        }
    }

    /// Create the record if it does not exist.
    pub fn put_record(&mut self, id: &DataId) {
        if self.records.put_record(id) {
            self.touched.insert(id.clone());
        }
    }

    /// Mark the record nonexistent.
    pub fn delete_record(&mut self, id: &DataId) {
        if self.records.delete_record(id) {
            self.touched.insert(id.clone());
        }
    }

    /// Root call mappings are not observable, so they never touch an id.
    pub fn put_root_call_id(&mut self, call_name: &str, arg: Option<&str>, id: DataId) {
        self.records.put_root_call_id(call_name, arg, id);
    }

    /// Ids changed so far in this batch.
    #[must_use]
    pub fn touched(&self) -> &HashSet<DataId> {
        &self.touched
    }
}

/// Record store and change emitter shared by the reader, runner and
/// observations.
#[derive(Debug, Default)]
pub struct StoreData {
    records: RwLock<RecordStore>,
    emitter: ChangeEmitter,
}

impl StoreData {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing record store.
    #[must_use]
    pub fn with_records(records: RecordStore) -> Self {
        Self {
            records: RwLock::new(records),
            emitter: ChangeEmitter::default(),
        }
    }

    /// Shared read access to the records.
    ///
    /// Do not hold the guard across a call that writes to this store.
    pub fn records(&self) -> RwLockReadGuard<'_, RecordStore> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscriptions notified after each batch.
    #[must_use]
    pub const fn emitter(&self) -> &ChangeEmitter {
        &self.emitter
    }

    /// Apply a group of writes, then notify affected subscriptions once.
    ///
    /// All writes are applied before any notification fires, and listeners
    /// run with no store lock held.
    pub fn write_batch<R>(&self, writes: impl FnOnce(&mut WriteBatch<'_>) -> R) -> R {
        let (result, touched) = {
            let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
            let mut batch = WriteBatch::new(&mut guard);
            let result = writes(&mut batch);
            (result, batch.touched)
        };

        if !touched.is_empty() {
            trace!(touched = touched.len(), "write batch applied");
            self.broadcast(&touched);
        }
        result
    }

    /// Single-field write as its own batch.
    pub fn put_field(&self, id: &DataId, storage_key: &str, value: FieldValue) {
        self.write_batch(|batch| batch.put_field(id, storage_key, value));
    }

    /// Register a root call mapping. Touches no record.
    pub fn put_root_call_id(&self, call_name: &str, arg: Option<&str>, id: DataId) {
        self.write_batch(|batch| batch.put_root_call_id(call_name, arg, id));
    }

    /// Serializable copy of the current records.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.records().snapshot()
    }

    fn broadcast(&self, touched: &HashSet<DataId>) {
        let affected = self.emitter.affected(touched);
        if affected.is_empty() {
            return;
        }

        let mut changed = Vec::with_capacity(affected.len());
        {
            let records = self.records();
            for (subscription_id, subscriber) in affected {
                let recomputed = subscriber.recompute(&records);
                self.emitter.update_interest(subscription_id, recomputed.interest);
                if recomputed.changed {
                    changed.push(subscriber);
                }
            }
        }

        for subscriber in changed {
            subscriber.notify();
        }
    }
}
