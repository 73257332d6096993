//! Coverage diffing.
//!
//! Works out which part of a root query the store cannot answer yet, and
//! which part of it an in-flight fetch will not answer either.

use crate::data_id::DataId;
use crate::query::{QueryField, QueryFragment, QueryNode, RootQuery};
use crate::resolver::RootCallResolver;
use crate::storage::{RecordState, RecordStore};
use crate::value::FieldValue;

use super::writer::ID_FIELD;

/// Split `root` per argument value and keep only the unsatisfied selections.
///
/// Records the server reported as nonexistent count as satisfied. Root calls
/// that cannot be resolved to an id are fetched whole.
#[must_use]
pub fn diff_root_query(root: &RootQuery, records: &RecordStore, resolver: &RootCallResolver) -> Vec<RootQuery> {
    let mut out = Vec::new();
    for arg in root.arg_values() {
        let Some(data_id) = resolver.resolve_arg(&root.call_name, arg, records) else {
            out.push(root.narrowed(arg, root.children.clone()));
            continue;
        };
        match records.get_record_state(&data_id) {
            RecordState::Unknown => out.push(root.narrowed(arg, root.children.clone())),
            RecordState::Nonexistent => {}
            RecordState::Existent => {
                let missing = diff_selections(records, &data_id, &root.children);
                if !missing.is_empty() {
                    out.push(root.narrowed(arg, missing));
                }
            }
        }
    }
    out
}

fn diff_selections(records: &RecordStore, data_id: &DataId, children: &[QueryNode]) -> Vec<QueryNode> {
    let mut missing = Vec::new();
    for child in children {
        match child {
            QueryNode::Fragment(fragment) => {
                let inner = diff_selections(records, data_id, &fragment.children);
                if !inner.is_empty() {
                    missing.push(QueryFragment::new(fragment.name.clone(), inner).into());
                }
            }
            QueryNode::Field(field) => {
                if let Some(node) = diff_field(records, data_id, field) {
                    missing.push(node);
                }
            }
            QueryNode::Root(_) => {}
        }
    }
    missing
}

fn diff_field(records: &RecordStore, data_id: &DataId, field: &QueryField) -> Option<QueryNode> {
    let Some(stored) = records.get_field(data_id, &field.storage_key()) else {
        return Some(field.clone().into());
    };
    if field.is_leaf() {
        return None;
    }
    match stored {
        FieldValue::Null | FieldValue::Scalar(_) => None,
        FieldValue::Link(linked) => match records.get_record_state(linked) {
            RecordState::Unknown => Some(field.clone().into()),
            RecordState::Nonexistent => None,
            RecordState::Existent => {
                let inner = diff_selections(records, linked, &field.children);
                (!inner.is_empty()).then(|| field.with_replaced_children(inner).into())
            }
        },
        // Plural links are refetched whole when any element is incomplete.
        FieldValue::LinkedList(ids) => {
            let incomplete = ids.iter().any(|linked| match records.get_record_state(linked) {
                RecordState::Unknown => true,
                RecordState::Nonexistent => false,
                RecordState::Existent => !diff_selections(records, linked, &field.children).is_empty(),
            });
            incomplete.then(|| field.clone().into())
        }
    }
}

/// Selections of `want` that an in-flight fetch of `have` will not write.
///
/// `have` only helps when it targets the same root call and every argument
/// value of `want` is among its own, so a fetch of `nodes([1, 2])` answers a
/// subquery for `nodes([1])`. Anything else returns `want`'s selections
/// unchanged. A non-empty remainder keeps `want`'s `id` selection so the
/// records it writes stay keyed by their server ids.
#[must_use]
pub fn subtract_query(want: &RootQuery, have: &RootQuery) -> Vec<QueryNode> {
    if !same_records(have, want) {
        return want.children.clone();
    }
    let have: Vec<&QueryNode> = have.children.iter().collect();
    subtract_selections(&want.children, &have)
}

fn same_records(have: &RootQuery, want: &RootQuery) -> bool {
    if have.call_name != want.call_name {
        return false;
    }
    let fetched = have.arg_values();
    want.arg_values().iter().all(|arg| fetched.contains(arg))
}

fn subtract_selections(want: &[QueryNode], have: &[&QueryNode]) -> Vec<QueryNode> {
    let have_fields = flatten_fields(have);
    let mut rest = Vec::new();
    for node in want {
        match node {
            QueryNode::Fragment(fragment) => {
                let inner = subtract_selections(&fragment.children, have);
                if !inner.is_empty() {
                    rest.push(QueryFragment::new(fragment.name.clone(), inner).into());
                }
            }
            QueryNode::Field(field) => {
                let key = field.storage_key();
                let matching: Vec<&QueryField> = have_fields
                    .iter()
                    .copied()
                    .filter(|f| f.storage_key() == key)
                    .collect();
                if matching.is_empty() {
                    rest.push(node.clone());
                } else if !field.is_leaf() {
                    let have_children: Vec<&QueryNode> = matching.iter().flat_map(|f| f.children.iter()).collect();
                    let inner = subtract_selections(&field.children, &have_children);
                    if !inner.is_empty() {
                        rest.push(field.with_replaced_children(inner).into());
                    }
                }
            }
            QueryNode::Root(_) => {}
        }
    }
    keep_id(want, rest)
}

fn keep_id(want: &[QueryNode], mut rest: Vec<QueryNode>) -> Vec<QueryNode> {
    if rest.is_empty() {
        return rest;
    }
    let id = want
        .iter()
        .find(|node| node.as_field().is_some_and(|f| f.is_leaf() && f.name == ID_FIELD));
    if let Some(id) = id {
        if !rest.contains(id) {
            rest.insert(0, id.clone());
        }
    }
    rest
}

fn flatten_fields<'a>(nodes: &[&'a QueryNode]) -> Vec<&'a QueryField> {
    let mut out = Vec::new();
    for &node in nodes {
        collect_fields(node, &mut out);
    }
    out
}

fn collect_fields<'a>(node: &'a QueryNode, out: &mut Vec<&'a QueryField>) {
    match node {
        QueryNode::Field(field) => out.push(field),
        QueryNode::Fragment(fragment) => {
            for child in &fragment.children {
                collect_fields(child, out);
            }
        }
        QueryNode::Root(_) => {}
    }
}
