//! Normalized record arena.
//!
//! Records live in a single map keyed by `DataId`. Links between records are
//! stored as ids, never as nested values, and records are mutated field by
//! field so subscribers holding an id always see the same record.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::data_id::DataId;
use crate::value::FieldValue;

/// Root call key used when a root call takes no argument.
const NO_ARG: &str = "";

/// What the store knows about a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// The record has been fetched or written.
    Existent,
    /// The server confirmed the record does not exist.
    Nonexistent,
    /// The record was never queried.
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Record {
    fields: BTreeMap<String, FieldValue>,
}

/// In-memory normalized record store.
///
/// # Examples
///
/// ```
/// use gqlstore::{DataId, FieldValue, RecordState, RecordStore};
///
/// let mut store = RecordStore::new();
/// let id = DataId::new("4");
/// assert_eq!(store.get_record_state(&id), RecordState::Unknown);
///
/// assert!(store.put_field(&id, "name", FieldValue::scalar("Zuck")));
/// assert!(!store.put_field(&id, "name", FieldValue::scalar("Zuck")));
/// assert_eq!(store.get_record_state(&id), RecordState::Existent);
/// assert!(store.get_field(&id, "birthday").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    /// `None` marks a record the server reported as nonexistent.
    records: HashMap<DataId, Option<Record>>,
    root_calls: HashMap<String, HashMap<String, DataId>>,
}

impl RecordStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` exists, is known not to exist, or was never seen.
    #[must_use]
    pub fn get_record_state(&self, id: &DataId) -> RecordState {
        match self.records.get(id) {
            Some(Some(_)) => RecordState::Existent,
            Some(None) => RecordState::Nonexistent,
            None => RecordState::Unknown,
        }
    }

    /// Read one field. Absent fields and unknown records both yield `None`.
    #[must_use]
    pub fn get_field(&self, id: &DataId, storage_key: &str) -> Option<&FieldValue> {
        self.records.get(id)?.as_ref()?.fields.get(storage_key)
    }

    /// True if the field was fetched, including as `null`.
    #[must_use]
    pub fn has_field(&self, id: &DataId, storage_key: &str) -> bool {
        self.get_field(id, storage_key).is_some()
    }

    /// Write one field, creating the record if needed.
    ///
    /// Returns true if anything observable changed: the value differs, or the
    /// record did not exist before.
    pub fn put_field(&mut self, id: &DataId, storage_key: &str, value: FieldValue) -> bool {
        let slot = self.records.entry(id.clone()).or_insert(None);
        let created = slot.is_none();
        let record = slot.get_or_insert_with(Record::default);
        if record.fields.get(storage_key) == Some(&value) {
            return created;
        }
        record.fields.insert(storage_key.to_string(), value);
        true
    }

    /// Ensure `id` is an existent record. Returns true if its state changed.
    pub fn put_record(&mut self, id: &DataId) -> bool {
        let slot = self.records.entry(id.clone()).or_insert(None);
        if slot.is_some() {
            return false;
        }
        *slot = Some(Record::default());
        true
    }

    /// Mark `id` as nonexistent, dropping its fields.
    ///
    /// Returns true if its state changed.
    pub fn delete_record(&mut self, id: &DataId) -> bool {
        match self.records.insert(id.clone(), None) {
            Some(None) => false,
            Some(Some(_)) | None => true,
        }
    }

    /// Map a root call and argument to a record id, replacing any entry.
    pub fn put_root_call_id(&mut self, call_name: &str, arg: Option<&str>, id: DataId) {
        self.root_calls
            .entry(call_name.to_string())
            .or_default()
            .insert(arg.unwrap_or(NO_ARG).to_string(), id);
    }

    /// Record id registered for a root call and argument.
    #[must_use]
    pub fn get_data_id(&self, call_name: &str, arg: Option<&str>) -> Option<&DataId> {
        self.root_calls.get(call_name)?.get(arg.unwrap_or(NO_ARG))
    }

    /// Number of records, existent or not.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Serializable copy of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: self
                .records
                .iter()
                .map(|(id, record)| (id.clone(), record.as_ref().map(|r| r.fields.clone())))
                .collect(),
            root_calls: self
                .root_calls
                .iter()
                .map(|(call, args)| {
                    let args = args.iter().map(|(arg, id)| (arg.clone(), id.clone())).collect();
                    (call.clone(), args)
                })
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            records: snapshot
                .records
                .into_iter()
                .map(|(id, fields)| (id, fields.map(|fields| Record { fields })))
                .collect(),
            root_calls: snapshot
                .root_calls
                .into_iter()
                .map(|(call, args)| (call, args.into_iter().collect()))
                .collect(),
        }
    }
}

/// Serializable form of a `RecordStore`.
///
/// Ordered maps keep the serialized form deterministic.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Field maps by id; `None` for nonexistent records.
    pub records: BTreeMap<DataId, Option<BTreeMap<String, FieldValue>>>,
    /// Root call map: call name, then argument (`""` for none), to id.
    pub root_calls: BTreeMap<String, BTreeMap<String, DataId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_states() {
        let mut store = RecordStore::new();
        let id = DataId::new("1");
        assert_eq!(store.get_record_state(&id), RecordState::Unknown);

        assert!(store.put_record(&id));
        assert!(!store.put_record(&id));
        assert_eq!(store.get_record_state(&id), RecordState::Existent);

        assert!(store.delete_record(&id));
        assert!(!store.delete_record(&id));
        assert_eq!(store.get_record_state(&id), RecordState::Nonexistent);
        assert!(store.get_field(&id, "name").is_none());

        // Unknown ids are marked nonexistent too.
        assert!(store.delete_record(&DataId::new("2")));
    }

    #[test]
    fn absent_is_distinct_from_null() {
        let mut store = RecordStore::new();
        let id = DataId::new("1");
        store.put_field(&id, "name", FieldValue::Null);
        assert_eq!(store.get_field(&id, "name"), Some(&FieldValue::Null));
        assert_eq!(store.get_field(&id, "birthday"), None);
        assert!(store.has_field(&id, "name"));
        assert!(!store.has_field(&id, "birthday"));
    }

    #[test]
    fn put_field_reports_changes_only() {
        let mut store = RecordStore::new();
        let id = DataId::new("1");
        assert!(store.put_field(&id, "name", FieldValue::scalar("a")));
        assert!(!store.put_field(&id, "name", FieldValue::scalar("a")));
        assert!(store.put_field(&id, "name", FieldValue::scalar("b")));

        // Writing to a nonexistent record revives it even with a known value.
        store.delete_record(&id);
        assert!(store.put_field(&id, "name", FieldValue::scalar("b")));
        assert_eq!(store.get_record_state(&id), RecordState::Existent);
    }

    #[test]
    fn root_call_map() {
        let mut store = RecordStore::new();
        store.put_root_call_id("viewer", None, DataId::new("client:viewer"));
        store.put_root_call_id("username", Some("zuck"), DataId::new("4"));

        assert_eq!(store.get_data_id("viewer", None), Some(&DataId::new("client:viewer")));
        assert_eq!(store.get_data_id("username", Some("zuck")), Some(&DataId::new("4")));
        assert_eq!(store.get_data_id("username", Some("other")), None);

        // The mapping outlives its record.
        store.delete_record(&DataId::new("4"));
        assert_eq!(store.get_data_id("username", Some("zuck")), Some(&DataId::new("4")));
    }

    #[test]
    fn snapshot_restores_everything() {
        let mut store = RecordStore::new();
        let a = DataId::new("a");
        let b = DataId::new("b");
        store.put_field(&a, "friend", FieldValue::Link(b.clone()));
        store.put_field(&b, "friend", FieldValue::Link(a.clone()));
        store.delete_record(&DataId::new("gone"));
        store.put_root_call_id("node", Some("a"), a.clone());

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored = RecordStore::from_snapshot(serde_json::from_str(&json).unwrap());

        assert_eq!(restored.get_field(&a, "friend"), Some(&FieldValue::Link(b.clone())));
        assert_eq!(restored.get_field(&b, "friend"), Some(&FieldValue::Link(a.clone())));
        assert_eq!(restored.get_record_state(&DataId::new("gone")), RecordState::Nonexistent);
        assert_eq!(restored.get_data_id("node", Some("a")), Some(&a));
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
