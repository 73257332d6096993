//! Response normalization.
//!
//! A response is first flattened into a list of `RecordOp`s against a read
//! view of the store, then applied in one write batch. A malformed response
//! is rejected during staging, so it never leaves partial writes behind.

use serde_json::{Map, Value};

use crate::data_id::{DataId, CLIENT_ID_PREFIX};
use crate::error::{StoreResult, TransportError};
use crate::query::print::print_root;
use crate::query::{QueryField, QueryNode, RootQuery};
use crate::resolver::RootCallResolver;
use crate::storage::{RecordStore, StoreData, WriteBatch};
use crate::value::FieldValue;

/// Response field carrying a server-assigned record id.
pub const ID_FIELD: &str = "id";

/// One staged write.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOp {
    /// Create the record if it does not exist.
    PutRecord(DataId),
    /// Mark the record nonexistent.
    DeleteRecord(DataId),
    /// Write one field.
    PutField {
        id: DataId,
        storage_key: String,
        value: FieldValue,
    },
    /// Register a root call mapping.
    PutRootCallId {
        call_name: String,
        arg: Option<String>,
        id: DataId,
    },
}

struct Normalizer<'a> {
    records: &'a RecordStore,
    query_text: String,
    ops: Vec<RecordOp>,
}

/// Stage the writes for `payload`, the response to `root`.
pub fn normalize_response(
    root: &RootQuery,
    payload: &Value,
    records: &RecordStore,
    resolver: &RootCallResolver,
) -> Result<Vec<RecordOp>, TransportError> {
    let mut normalizer = Normalizer {
        records,
        query_text: print_root(root),
        ops: Vec::new(),
    };

    let args = root.arg_values();
    let items: Vec<&Value> = if root.is_plural() {
        let items = payload
            .as_array()
            .ok_or_else(|| normalizer.malformed("expected an array for a plural root call"))?;
        if items.len() != args.len() {
            return Err(normalizer.malformed(&format!(
                "expected {} results, got {}",
                args.len(),
                items.len()
            )));
        }
        items.iter().collect()
    } else {
        vec![payload]
    };

    for (arg, item) in args.into_iter().zip(items) {
        normalizer.write_root(root, resolver, arg, item)?;
    }
    Ok(normalizer.ops)
}

/// Apply staged writes to a batch.
pub fn apply_ops(batch: &mut WriteBatch<'_>, ops: Vec<RecordOp>) {
    for op in ops {
        match op {
            RecordOp::PutRecord(id) => batch.put_record(&id),
            RecordOp::DeleteRecord(id) => batch.delete_record(&id),
            RecordOp::PutField { id, storage_key, value } => batch.put_field(&id, &storage_key, value),
            RecordOp::PutRootCallId { call_name, arg, id } => {
                batch.put_root_call_id(&call_name, arg.as_deref(), id);
            }
        }
    }
}

/// Normalize and write `payload` as a single batch.
pub(crate) fn write_payload(
    data: &StoreData,
    resolver: &RootCallResolver,
    root: &RootQuery,
    payload: &Value,
) -> StoreResult<()> {
    let ops = {
        let records = data.records();
        normalize_response(root, payload, &records, resolver)?
    };
    data.write_batch(|batch| apply_ops(batch, ops));
    Ok(())
}

impl Normalizer<'_> {
    fn malformed(&self, reason: &str) -> TransportError {
        TransportError::MalformedResponse {
            query: self.query_text.clone(),
            reason: reason.to_string(),
        }
    }

    fn write_root(
        &mut self,
        root: &RootQuery,
        resolver: &RootCallResolver,
        arg: Option<&str>,
        item: &Value,
    ) -> Result<(), TransportError> {
        let call_name = root.call_name.as_str();
        let data_id = match resolver.resolve_arg(call_name, arg, self.records) {
            Some(id) => id,
            None => {
                let id = item
                    .as_object()
                    .and_then(response_id)
                    .unwrap_or_else(|| root_client_id(call_name, arg));
                // Mappings written by responses are never replaced.
                if !resolver.is_identity_call(call_name) {
                    self.ops.push(RecordOp::PutRootCallId {
                        call_name: call_name.to_string(),
                        arg: arg.map(str::to_string),
                        id: id.clone(),
                    });
                }
                id
            }
        };

        match item {
            Value::Null => {
                self.ops.push(RecordOp::DeleteRecord(data_id));
                Ok(())
            }
            Value::Object(object) => self.write_record(&data_id, &root.children, object),
            other => Err(self.malformed(&format!("expected an object or null at the root, got {other}"))),
        }
    }

    fn write_record(
        &mut self,
        data_id: &DataId,
        children: &[QueryNode],
        object: &Map<String, Value>,
    ) -> Result<(), TransportError> {
        self.ops.push(RecordOp::PutRecord(data_id.clone()));
        self.write_selections(data_id, children, object)
    }

    fn write_selections(
        &mut self,
        data_id: &DataId,
        children: &[QueryNode],
        object: &Map<String, Value>,
    ) -> Result<(), TransportError> {
        for child in children {
            match child {
                QueryNode::Fragment(fragment) => self.write_selections(data_id, &fragment.children, object)?,
                QueryNode::Field(field) => self.write_field(data_id, field, object)?,
                QueryNode::Root(_) => {}
            }
        }
        Ok(())
    }

    fn write_field(
        &mut self,
        data_id: &DataId,
        field: &QueryField,
        object: &Map<String, Value>,
    ) -> Result<(), TransportError> {
        // Fields missing from the response stay absent.
        let Some(value) = object.get(field.response_key()) else {
            return Ok(());
        };
        let storage_key = field.storage_key();

        if field.is_leaf() {
            self.put_field(data_id, storage_key, FieldValue::scalar(value.clone()));
            return Ok(());
        }

        match value {
            Value::Null => self.put_field(data_id, storage_key, FieldValue::Null),
            Value::Object(linked) => {
                let existing = self
                    .records
                    .get_field(data_id, &storage_key)
                    .and_then(FieldValue::as_link)
                    .cloned();
                let linked_id = response_id(linked)
                    .or(existing)
                    .unwrap_or_else(|| nested_client_id(data_id, &storage_key, None));
                self.write_record(&linked_id, &field.children, linked)?;
                self.put_field(data_id, storage_key, FieldValue::Link(linked_id));
            }
            Value::Array(items) => {
                // Elements without an id are keyed by response position.
                let mut ids = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    match item {
                        Value::Object(linked) => {
                            let linked_id = response_id(linked)
                                .unwrap_or_else(|| nested_client_id(data_id, &storage_key, Some(idx)));
                            self.write_record(&linked_id, &field.children, linked)?;
                            ids.push(linked_id);
                        }
                        // Null elements carry no identity to link to.
                        Value::Null => {}
                        other => {
                            return Err(self.malformed(&format!(
                                "expected objects in linked list '{storage_key}', got {other}"
                            )));
                        }
                    }
                }
                self.put_field(data_id, storage_key, FieldValue::LinkedList(ids));
            }
            other => {
                return Err(self.malformed(&format!("expected an object for linked field '{storage_key}', got {other}")));
            }
        }
        Ok(())
    }

    fn put_field(&mut self, id: &DataId, storage_key: String, value: FieldValue) {
        self.ops.push(RecordOp::PutField {
            id: id.clone(),
            storage_key,
            value,
        });
    }
}

fn response_id(object: &Map<String, Value>) -> Option<DataId> {
    match object.get(ID_FIELD)? {
        Value::String(id) => Some(DataId::new(id.clone())),
        Value::Number(id) => Some(DataId::new(id.to_string())),
        _ => None,
    }
}

fn root_client_id(call_name: &str, arg: Option<&str>) -> DataId {
    match arg {
        Some(arg) => DataId::client(format!("{call_name}:{arg}")),
        None => DataId::client(call_name),
    }
}

fn nested_client_id(parent: &DataId, storage_key: &str, index: Option<usize>) -> DataId {
    let base = parent.as_str().strip_prefix(CLIENT_ID_PREFIX).unwrap_or(parent.as_str());
    match index {
        Some(idx) => DataId::client(format!("{base}:{storage_key}:{idx}")),
        None => DataId::client(format!("{base}:{storage_key}")),
    }
}
