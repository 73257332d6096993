//! Query data reader.
//!
//! `read` and `observe` share one traversal core; they differ only in the
//! sink they hand it. A one-shot read discards visited ids, an observation
//! keeps them as its interest set and re-runs the traversal when one of them
//! is written.

mod traversal;

use std::sync::Arc;

use serde_json::Value;

use crate::data_id::DataId;
use crate::observe::Observable;
use crate::query::{QueryFilter, QueryNode};
use crate::storage::{RecordStore, StoreData};

pub use traversal::{traverse, InterestSink, NoopSink, VisitSink, DATA_ID_KEY};

/// Read and observe entry points used by the `GraphStore` facade.
///
/// The facade forwards its arguments unchanged, so tests can inject a
/// recording implementation.
pub trait StoreReader: Send + Sync {
    /// Read `query` rooted at `data_id`.
    fn read(
        &self,
        records: &RecordStore,
        query: &QueryNode,
        data_id: &DataId,
        filter: Option<&QueryFilter>,
    ) -> Option<Value>;

    /// Observe `query` rooted at `data_id`.
    fn observe(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_id: DataId,
        filter: Option<QueryFilter>,
    ) -> Observable<Option<Value>>;

    /// Observe `query` rooted at each of `data_ids` as one ordered value.
    fn observe_all(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_ids: Vec<DataId>,
        filter: Option<QueryFilter>,
    ) -> Observable<Vec<Option<Value>>>;
}

/// Default reader backed by `traverse`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryTraversal;

impl StoreReader for QueryTraversal {
    fn read(
        &self,
        records: &RecordStore,
        query: &QueryNode,
        data_id: &DataId,
        filter: Option<&QueryFilter>,
    ) -> Option<Value> {
        traverse(records, query, data_id, filter, &mut NoopSink)
    }

    fn observe(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_id: DataId,
        filter: Option<QueryFilter>,
    ) -> Observable<Option<Value>> {
        Observable::register(Arc::clone(data), move |records| {
            let mut sink = InterestSink::default();
            let value = traverse(records, &query, &data_id, filter.as_ref(), &mut sink);
            (value, sink.into_ids())
        })
    }

    fn observe_all(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_ids: Vec<DataId>,
        filter: Option<QueryFilter>,
    ) -> Observable<Vec<Option<Value>>> {
        // Any touched element recomputes the whole sequence.
        Observable::register(Arc::clone(data), move |records| {
            let mut sink = InterestSink::default();
            let values = data_ids
                .iter()
                .map(|data_id| traverse(records, &query, data_id, filter.as_ref(), &mut sink))
                .collect();
            (values, sink.into_ids())
        })
    }
}
