use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use gqlstore::observe::Observable;
use gqlstore::{
    CallArg, DataId, FetchCallback, FetchHandle, FetchStatus, FieldValue, GraphStore, QueryField, QueryFilter,
    QueryNode, QueryRunner, QuerySet, QueryTraversal, RecordStore, RootQuery, StoreData, StoreReader,
};

/// One call seen by the recording reader.
#[derive(Debug, Clone)]
struct ReadCall {
    data_id: DataId,
    filter: Option<QueryFilter>,
}

/// Reader that records every call and delegates to the real traversal.
#[derive(Default)]
struct RecordingReader {
    reads: Mutex<Vec<ReadCall>>,
    observed: Mutex<Vec<ReadCall>>,
}

impl RecordingReader {
    fn reads(&self) -> Vec<ReadCall> {
        self.reads.lock().unwrap().clone()
    }

    fn observed(&self) -> Vec<ReadCall> {
        self.observed.lock().unwrap().clone()
    }
}

impl StoreReader for RecordingReader {
    fn read(
        &self,
        records: &RecordStore,
        query: &QueryNode,
        data_id: &DataId,
        filter: Option<&QueryFilter>,
    ) -> Option<Value> {
        self.reads.lock().unwrap().push(ReadCall {
            data_id: data_id.clone(),
            filter: filter.cloned(),
        });
        QueryTraversal.read(records, query, data_id, filter)
    }

    fn observe(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_id: DataId,
        filter: Option<QueryFilter>,
    ) -> Observable<Option<Value>> {
        self.observed.lock().unwrap().push(ReadCall {
            data_id: data_id.clone(),
            filter: filter.clone(),
        });
        QueryTraversal.observe(data, query, data_id, filter)
    }

    fn observe_all(
        &self,
        data: &Arc<StoreData>,
        query: Arc<QueryNode>,
        data_ids: Vec<DataId>,
        filter: Option<QueryFilter>,
    ) -> Observable<Vec<Option<Value>>> {
        for data_id in &data_ids {
            self.observed.lock().unwrap().push(ReadCall {
                data_id: data_id.clone(),
                filter: filter.clone(),
            });
        }
        QueryTraversal.observe_all(data, query, data_ids, filter)
    }
}

/// Runner that records the exact arguments it was handed.
#[derive(Default)]
struct RecordingRunner {
    runs: Mutex<Vec<(&'static str, Arc<QuerySet>, FetchCallback)>>,
}

impl QueryRunner for RecordingRunner {
    fn run(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        self.runs.lock().unwrap().push(("run", queries, callback));
        FetchHandle::noop()
    }

    fn force_fetch(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        self.runs.lock().unwrap().push(("force", queries, callback));
        FetchHandle::noop()
    }
}

fn store_with(reader: Arc<RecordingReader>, records: RecordStore) -> GraphStore {
    GraphStore::builder()
        .records(records)
        .runner(Arc::new(RecordingRunner::default()))
        .reader(reader)
        .build()
        .unwrap()
}

fn seeded_records() -> RecordStore {
    let mut records = RecordStore::new();
    for (id, name) in [("123", "Ann"), ("456", "Bob")] {
        records.put_field(&DataId::new(id), "id", FieldValue::scalar(id));
        records.put_field(&DataId::new(id), "name", FieldValue::scalar(name));
    }
    records
}

fn name_query() -> QueryNode {
    RootQuery::new("node").with_child(QueryField::scalar("name")).into()
}

#[test]
fn read_forwards_id_and_filter_unchanged() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let filter = QueryFilter::new(|_| true);

    let value = store.read(&name_query(), &DataId::new("123"), Some(&filter)).unwrap();
    assert_eq!(value["name"], "Ann");

    let unfiltered = store.read(&name_query(), &DataId::new("456"), None);
    assert!(unfiltered.is_some());

    let reads = reader.reads();
    assert_eq!(reads.len(), 2);
    assert_eq!(reads[0].data_id, DataId::new("123"));
    assert!(QueryFilter::ptr_eq(reads[0].filter.as_ref().unwrap(), &filter));
    assert_eq!(reads[1].data_id, DataId::new("456"));
    assert!(reads[1].filter.is_none());
}

#[test]
fn read_all_reads_each_id_in_order() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let filter = QueryFilter::new(|_| true);
    let ids = [DataId::new("456"), DataId::new("missing"), DataId::new("123")];

    let values = store.read_all(&name_query(), &ids, Some(&filter));
    assert_eq!(values.len(), 3);
    assert_eq!(values[0].as_ref().unwrap()["name"], "Bob");
    assert!(values[1].is_none());
    assert_eq!(values[2].as_ref().unwrap()["name"], "Ann");

    let reads = reader.reads();
    let seen: Vec<DataId> = reads.iter().map(|r| r.data_id.clone()).collect();
    assert_eq!(seen, ids.to_vec());
    assert!(reads
        .iter()
        .all(|r| QueryFilter::ptr_eq(r.filter.as_ref().unwrap(), &filter)));
}

#[test]
fn read_query_on_identity_call_reads_each_argument() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let query: QueryNode = RootQuery::new("nodes")
        .with_arg(CallArg::list(["123", "456"]))
        .with_child(QueryField::scalar("name"))
        .into();

    let values = store.read_query(&query, None);
    assert_eq!(values.len(), 2);

    let seen: Vec<DataId> = reader.reads().into_iter().map(|r| r.data_id).collect();
    assert_eq!(seen, vec![DataId::new("123"), DataId::new("456")]);
}

#[test]
fn read_query_on_unregistered_call_yields_placeholder_without_reading() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let query: QueryNode = RootQuery::new("search")
        .with_arg(CallArg::single("free text"))
        .with_child(QueryField::scalar("name"))
        .into();

    assert_eq!(store.read_query(&query, None), vec![None]);
    assert!(reader.reads().is_empty());
}

#[test]
fn read_query_uses_registered_root_call() {
    let reader = Arc::new(RecordingReader::default());
    let mut records = RecordStore::new();
    let viewer = DataId::client("viewer");
    records.put_root_call_id("viewer", None, viewer.clone());
    records.put_field(&viewer, "name", FieldValue::scalar("me"));
    let store = store_with(Arc::clone(&reader), records);

    let query: QueryNode = RootQuery::new("viewer").with_child(QueryField::scalar("name")).into();
    let values = store.read_query(&query, None);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].as_ref().unwrap()["__dataID__"], "client:viewer");

    let reads = reader.reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].data_id, viewer);
}

#[test]
fn observe_forwards_arguments_and_notifies_once_per_batch() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let filter = QueryFilter::new(|_| true);
    let query: Arc<QueryNode> = Arc::new(
        RootQuery::new("node")
            .with_child(QueryField::scalar("id"))
            .with_child(QueryField::scalar("name"))
            .into(),
    );

    let observable = store.observe(Arc::clone(&query), DataId::new("123"), Some(filter.clone()));
    assert_eq!(observable.get_current_value().unwrap()["name"], "Ann");
    let observed = reader.observed();
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].data_id, DataId::new("123"));
    assert!(QueryFilter::ptr_eq(observed[0].filter.as_ref().unwrap(), &filter));

    let notifications = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notifications);
    observable.add_listener(move |value: &Option<Value>| sink.lock().unwrap().push(value.clone()));

    store.store_data().write_batch(|batch| {
        batch.put_field(&DataId::new("123"), "name", FieldValue::scalar("Annie"));
        batch.put_field(&DataId::new("123"), "id", FieldValue::scalar("123"));
        batch.put_field(&DataId::new("123"), "nickname", FieldValue::scalar("A"));
    });

    let notifications = notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].as_ref().unwrap()["name"], "Annie");
}

#[test]
fn observe_all_forwards_ids_in_order() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let query = Arc::new(name_query());
    let ids = vec![DataId::new("456"), DataId::new("123")];

    let observable = store.observe_all(query, ids.clone(), None);
    let values = observable.get_current_value();
    assert_eq!(values[0].as_ref().unwrap()["name"], "Bob");
    assert_eq!(values[1].as_ref().unwrap()["name"], "Ann");

    let seen: Vec<DataId> = reader.observed().into_iter().map(|r| r.data_id).collect();
    assert_eq!(seen, ids);
}

#[test]
fn prime_and_force_forward_exact_references() {
    let runner = Arc::new(RecordingRunner::default());
    let store = GraphStore::builder()
        .runner(Arc::clone(&runner) as Arc<dyn QueryRunner>)
        .build()
        .unwrap();

    let queries = Arc::new(QuerySet::from([("q".to_string(), RootQuery::new("viewer"))]));
    let callback: FetchCallback = Arc::new(|_: FetchStatus| {});

    let _prime = store.prime_cache(Arc::clone(&queries), Arc::clone(&callback));
    let _force = store.force_fetch(Arc::clone(&queries), Arc::clone(&callback));

    let runs = runner.runs.lock().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].0, "run");
    assert_eq!(runs[1].0, "force");
    for (_, seen_queries, seen_callback) in runs.iter() {
        assert!(Arc::ptr_eq(seen_queries, &queries));
        assert!(Arc::ptr_eq(seen_callback, &callback));
    }
}

#[test]
fn hydrated_viewer_is_read_through_root_call_map() {
    let store = GraphStore::builder()
        .runner(Arc::new(RecordingRunner::default()))
        .build()
        .unwrap();
    let root = RootQuery::new("viewer").with_child(QueryField::linked(
        "actor",
        [QueryField::scalar("id"), QueryField::scalar("name")],
    ));
    store
        .handle_query_payload(&root, &json!({"actor": {"id": "4", "name": "Zuck"}}))
        .unwrap();

    let values = store.read_query(&root.into(), None);
    let viewer = values[0].as_ref().unwrap();
    assert_eq!(viewer["__dataID__"], "client:viewer");
    assert_eq!(viewer["actor"]["name"], "Zuck");
    assert_eq!(viewer["actor"]["__dataID__"], "4");
}

#[test]
fn read_query_with_partly_registered_list_reads_only_known_arguments() {
    let reader = Arc::new(RecordingReader::default());
    let mut records = RecordStore::new();
    records.put_root_call_id("usernames", Some("b"), DataId::new("2"));
    records.put_field(&DataId::new("2"), "name", FieldValue::scalar("Bea"));
    let store = store_with(Arc::clone(&reader), records);

    let query: QueryNode = RootQuery::new("usernames")
        .with_arg(CallArg::list(["a", "b", "c"]))
        .with_child(QueryField::scalar("name"))
        .into();
    let values = store.read_query(&query, None);

    assert_eq!(values.len(), 3);
    assert!(values[0].is_none());
    assert_eq!(values[1].as_ref().unwrap()["name"], "Bea");
    assert!(values[2].is_none());

    let reads = reader.reads();
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].data_id, DataId::new("2"));
}

#[test]
fn observe_all_forwards_the_same_filter_for_every_id() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let filter = QueryFilter::new(|_| true);
    let ids = vec![DataId::new("123"), DataId::new("456")];

    let observable = store.observe_all(Arc::new(name_query()), ids.clone(), Some(filter.clone()));
    assert_eq!(observable.get_current_value().len(), 2);

    let observed = reader.observed();
    assert_eq!(observed.len(), 2);
    for (call, id) in observed.iter().zip(&ids) {
        assert_eq!(&call.data_id, id);
        assert!(QueryFilter::ptr_eq(call.filter.as_ref().unwrap(), &filter));
    }
}

#[test]
fn listeners_see_every_write_of_the_batch() {
    let reader = Arc::new(RecordingReader::default());
    let store = store_with(Arc::clone(&reader), seeded_records());
    let observable = store.observe(Arc::new(name_query()), DataId::new("123"), None);

    let data = Arc::clone(store.store_data());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    observable.add_listener(move |_: &Option<Value>| {
        let records = data.records();
        sink.lock().unwrap().push((
            records.get_field(&DataId::new("123"), "name").cloned(),
            records.get_field(&DataId::new("456"), "name").cloned(),
        ));
    });

    store.store_data().write_batch(|batch| {
        batch.put_field(&DataId::new("123"), "name", FieldValue::scalar("Annie"));
        batch.put_field(&DataId::new("456"), "name", FieldValue::scalar("Bobby"));
    });

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(Some(FieldValue::scalar("Annie")), Some(FieldValue::scalar("Bobby")))]
    );
}
