use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use gqlstore::{
    CallArg, DataId, FetchStatus, FieldValue, FnNetworkLayer, GraphStore, QueryField, QueryFilter, QueryFragment,
    QueryNode, QueryResult, QuerySet, RootQuery, StoreError,
};

fn offline_store() -> GraphStore {
    let network = FnNetworkLayer::new(|_: &RootQuery| -> QueryResult { Ok(json!(null)) });
    GraphStore::new(Arc::new(network))
}

fn friend_query() -> Arc<QueryNode> {
    Arc::new(
        RootQuery::new("node")
            .with_child(QueryField::scalar("name"))
            .with_child(QueryField::linked("bestFriend", [QueryField::scalar("name")]))
            .into(),
    )
}

fn seed(store: &GraphStore) {
    store.store_data().write_batch(|batch| {
        batch.put_field(&DataId::new("4"), "name", FieldValue::scalar("Zuck"));
        batch.put_field(&DataId::new("4"), "bestFriend", FieldValue::Link(DataId::new("5")));
        batch.put_field(&DataId::new("5"), "name", FieldValue::scalar("Chris"));
    });
}

fn counter() -> (Arc<AtomicUsize>, impl Fn(&Option<Value>) + Send + Sync + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    (calls, move |_: &Option<Value>| {
        seen.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn linked_record_write_renotifies_parent_observation() {
    let store = offline_store();
    seed(&store);
    let observable = store.observe(friend_query(), DataId::new("4"), None);
    let (calls, listener) = counter();
    observable.add_listener(listener);

    store
        .store_data()
        .put_field(&DataId::new("5"), "name", FieldValue::scalar("Christopher"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let value = observable.get_current_value().unwrap();
    assert_eq!(value["bestFriend"]["name"], "Christopher");
}

#[test]
fn relinking_moves_the_interest_set() {
    let store = offline_store();
    seed(&store);
    let observable = store.observe(friend_query(), DataId::new("4"), None);
    assert!(observable.interest().contains(&DataId::new("5")));

    store.store_data().write_batch(|batch| {
        batch.put_field(&DataId::new("6"), "name", FieldValue::scalar("Dustin"));
        batch.put_field(&DataId::new("4"), "bestFriend", FieldValue::Link(DataId::new("6")));
    });
    let interest = observable.interest();
    assert!(interest.contains(&DataId::new("6")));
    assert!(!interest.contains(&DataId::new("5")));

    let (calls, listener) = counter();
    observable.add_listener(listener);
    store.store_data().put_field(&DataId::new("5"), "name", FieldValue::scalar("ignored"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    store.store_data().put_field(&DataId::new("6"), "name", FieldValue::scalar("D"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unchanged_write_does_not_notify() {
    let store = offline_store();
    seed(&store);
    let observable = store.observe(friend_query(), DataId::new("4"), None);
    let (calls, listener) = counter();
    observable.add_listener(listener);

    store.store_data().put_field(&DataId::new("4"), "name", FieldValue::scalar("Zuck"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn observation_of_unknown_record_fires_when_fetched() {
    let network = FnNetworkLayer::new(|query: &RootQuery| -> QueryResult {
        assert_eq!(query.call_name, "node");
        Ok(json!({"id": "4", "name": "Zuck", "bestFriend": null}))
    });
    let store = GraphStore::new(Arc::new(network));
    let observable = store.observe(friend_query(), DataId::new("4"), None);
    assert_eq!(observable.get_current_value(), None);
    let stream = observable.subscribe_stream(4);

    let root = RootQuery::new("node")
        .with_arg(CallArg::single("4"))
        .with_child(QueryField::scalar("name"))
        .with_child(QueryField::linked("bestFriend", [QueryField::scalar("name")]));
    let queries = Arc::new(QuerySet::from([("q".to_string(), root)]));
    let _handle = store.prime_cache(queries, Arc::new(|status: FetchStatus| assert!(status.is_success())));

    let value = stream.recv_timeout(Duration::from_secs(1)).unwrap().unwrap();
    assert_eq!(value["name"], "Zuck");
    assert_eq!(value["bestFriend"], Value::Null);
    assert!(matches!(stream.try_recv(), Ok(None)));
}

#[test]
fn filter_prunes_fragments_in_observed_result() {
    let store = offline_store();
    seed(&store);
    let query: Arc<QueryNode> = Arc::new(
        RootQuery::new("node")
            .with_child(QueryField::scalar("name"))
            .with_child(QueryFragment::new("Friend", [QueryField::linked("bestFriend", [QueryField::scalar("name")])]))
            .into(),
    );
    let filter = QueryFilter::new(|node| node.as_fragment().is_none());

    let observable = store.observe(query, DataId::new("4"), Some(filter));
    let value = observable.get_current_value().unwrap();
    assert_eq!(value["name"], "Zuck");
    assert!(value.get("bestFriend").is_none());
    assert!(!observable.interest().contains(&DataId::new("5")));
}

#[test]
fn observe_all_aggregates_and_tracks_deletes() {
    let store = offline_store();
    seed(&store);
    let ids = vec![DataId::new("4"), DataId::new("5")];
    let observable = store.observe_all(friend_query(), ids, None);
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    observable.add_listener(move |values: &Vec<Option<Value>>| {
        assert_eq!(values.len(), 2);
        seen.fetch_add(1, Ordering::SeqCst);
    });

    store.store_data().write_batch(|batch| {
        batch.delete_record(&DataId::new("5"));
    });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let values = observable.get_current_value();
    assert_eq!(values[0].as_ref().unwrap()["bestFriend"], Value::Null);
    assert!(values[1].is_none());
}

#[test]
fn disposed_observation_stream_disconnects() {
    let store = offline_store();
    seed(&store);
    let observable = store.observe(friend_query(), DataId::new("4"), None);
    let stream = observable.subscribe_stream(1);

    observable.dispose();
    observable.dispose();
    assert_eq!(store.store_data().emitter().subscription_count(), 0);

    store.store_data().put_field(&DataId::new("4"), "name", FieldValue::scalar("Mark"));
    assert!(matches!(stream.try_recv(), Ok(None) | Err(StoreError::Disconnected { .. })));
    drop(observable);
    assert!(matches!(stream.recv(), Err(StoreError::Disconnected { .. })));
}
