//! Query-shaped traversal of the record store.
//!
//! The traversal follows the finite query shape, not the record graph, so
//! cyclic links terminate. Every record id it looks at is reported to a
//! `VisitSink`; observations use that to build their interest sets.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::data_id::DataId;
use crate::query::{QueryFilter, QueryNode};
use crate::storage::{RecordState, RecordStore};
use crate::value::FieldValue;

/// Key holding the record id in every read result object.
pub const DATA_ID_KEY: &str = "__dataID__";

/// Receives every record id a traversal looks at.
pub trait VisitSink {
    /// Called for the root id and every linked id the traversal looks at.
    fn visit(&mut self, id: &DataId);
}

/// Sink for one-shot reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl VisitSink for NoopSink {
    fn visit(&mut self, _id: &DataId) {}
}

/// Sink collecting the interest set of an observation.
#[derive(Debug, Default, Clone)]
pub struct InterestSink {
    ids: HashSet<DataId>,
}

impl InterestSink {
    /// The collected interest set.
    #[must_use]
    pub fn into_ids(self) -> HashSet<DataId> {
        self.ids
    }
}

impl VisitSink for InterestSink {
    fn visit(&mut self, id: &DataId) {
        self.ids.insert(id.clone());
    }
}

/// Rebuild the result of `query` rooted at `data_id`.
///
/// Returns `None` unless the record exists. Fields never fetched are left out
/// of the result; fields stored as null are `null`.
pub fn traverse(
    records: &RecordStore,
    query: &QueryNode,
    data_id: &DataId,
    filter: Option<&QueryFilter>,
    sink: &mut dyn VisitSink,
) -> Option<Value> {
    sink.visit(data_id);
    if records.get_record_state(data_id) != RecordState::Existent {
        return None;
    }
    Some(Value::Object(read_record(records, query.children(), data_id, filter, sink)))
}

fn read_record(
    records: &RecordStore,
    children: &[QueryNode],
    data_id: &DataId,
    filter: Option<&QueryFilter>,
    sink: &mut dyn VisitSink,
) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(DATA_ID_KEY.to_string(), Value::String(data_id.to_string()));
    read_children(records, children, data_id, filter, sink, &mut out);
    out
}

fn read_children(
    records: &RecordStore,
    children: &[QueryNode],
    data_id: &DataId,
    filter: Option<&QueryFilter>,
    sink: &mut dyn VisitSink,
    out: &mut Map<String, Value>,
) {
    for child in children {
        if filter.is_some_and(|f| !f.accepts(child)) {
            continue;
        }
        match child {
            QueryNode::Fragment(fragment) => {
                read_children(records, &fragment.children, data_id, filter, sink, out);
            }
            QueryNode::Field(field) => {
                let Some(stored) = records.get_field(data_id, &field.storage_key()) else {
                    continue;
                };
                let value = match stored {
                    FieldValue::Scalar(v) => Some(v.clone()),
                    FieldValue::Null => Some(Value::Null),
                    FieldValue::Link(linked) => read_linked(records, &field.children, linked, filter, sink),
                    FieldValue::LinkedList(ids) => Some(Value::Array(
                        ids.iter()
                            .map(|linked| {
                                read_linked(records, &field.children, linked, filter, sink).unwrap_or(Value::Null)
                            })
                            .collect(),
                    )),
                };
                if let Some(value) = value {
                    out.insert(field.response_key().to_string(), value);
                }
            }
            // Root nodes only appear at the top of a query.
            QueryNode::Root(_) => {}
        }
    }
}

fn read_linked(
    records: &RecordStore,
    children: &[QueryNode],
    data_id: &DataId,
    filter: Option<&QueryFilter>,
    sink: &mut dyn VisitSink,
) -> Option<Value> {
    sink.visit(data_id);
    match records.get_record_state(data_id) {
        RecordState::Existent => Some(Value::Object(read_record(records, children, data_id, filter, sink))),
        RecordState::Nonexistent => Some(Value::Null),
        RecordState::Unknown => None,
    }
}
