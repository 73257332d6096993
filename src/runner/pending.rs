//! Deduplicating query runner.
//!
//! Every outstanding network fetch is tracked with the set of requests
//! waiting on it. A prime request attaches to every in-flight fetch that
//! overlaps its own subquery and only sends what none of them asks for. A
//! fetch whose last waiter is disposed is dropped from the table and its
//! result discarded.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::query::print::{print_root, signature};
use crate::query::{QuerySet, RootQuery};
use crate::resolver::RootCallResolver;
use crate::storage::StoreData;
use crate::transport::{NetworkLayer, QueryRequest, QueryResult};

use super::diff::{diff_root_query, subtract_query};
use super::writer::write_payload;
use super::{FetchCallback, FetchHandle, FetchStatus, QueryRunner, RunnerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FetchId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RequestId(u64);

struct InFlightFetch {
    query: Arc<RootQuery>,
    signature: String,
    waiters: BTreeSet<RequestId>,
}

struct PendingRequest {
    callback: FetchCallback,
    remaining: BTreeSet<FetchId>,
}

#[derive(Default)]
struct RunnerState {
    next_fetch_id: u64,
    next_request_id: u64,
    fetches: HashMap<FetchId, InFlightFetch>,
    by_signature: HashMap<String, FetchId>,
    requests: HashMap<RequestId, PendingRequest>,
}

impl RunnerState {
    fn allocate_request(&mut self) -> RequestId {
        self.next_request_id += 1;
        RequestId(self.next_request_id)
    }

    fn allocate_fetch(&mut self) -> FetchId {
        self.next_fetch_id += 1;
        FetchId(self.next_fetch_id)
    }

    /// Attach `request` to the in-flight fetches that overlap `query` and
    /// strip what they fetch from its selections.
    ///
    /// Returns the fetches attached to. `query` is left with the selections
    /// still to be sent, empty when nothing is left.
    fn attach_in_flight(&mut self, request: RequestId, signature: &str, query: &mut RootQuery) -> Vec<FetchId> {
        if let Some(&id) = self.by_signature.get(signature) {
            if let Some(fetch) = self.fetches.get_mut(&id) {
                fetch.waiters.insert(request);
                query.children.clear();
                return vec![id];
            }
        }

        // Oldest first, so attachment does not depend on hash order.
        let mut ids: Vec<FetchId> = self.fetches.keys().copied().collect();
        ids.sort_unstable();

        let mut attached = Vec::new();
        for id in ids {
            let Some(fetch) = self.fetches.get_mut(&id) else {
                continue;
            };
            let rest = subtract_query(query, &fetch.query);
            if rest == query.children {
                continue;
            }
            fetch.waiters.insert(request);
            attached.push(id);
            query.children = rest;
            if query.children.is_empty() {
                break;
            }
        }
        attached
    }

    fn remove_fetch(&mut self, id: FetchId) -> Option<InFlightFetch> {
        let fetch = self.fetches.remove(&id)?;
        if self.by_signature.get(&fetch.signature) == Some(&id) {
            self.by_signature.remove(&fetch.signature);
        }
        Some(fetch)
    }

    /// Remove `request` from every fetch it waits on, dropping fetches that
    /// no longer have any waiter.
    fn detach(&mut self, request: RequestId, fetches: &BTreeSet<FetchId>) {
        for fetch_id in fetches {
            let orphaned = match self.fetches.get_mut(fetch_id) {
                Some(fetch) => {
                    fetch.waiters.remove(&request);
                    fetch.waiters.is_empty()
                }
                None => false,
            };
            if orphaned {
                if let Some(fetch) = self.remove_fetch(*fetch_id) {
                    debug!(query = %print_root(&fetch.query), "fetch abandoned by every caller");
                }
            }
        }
    }
}

struct RunnerInner {
    data: Arc<StoreData>,
    network: Arc<dyn NetworkLayer>,
    resolver: RootCallResolver,
    config: RunnerConfig,
    state: Mutex<RunnerState>,
}

/// Default `QueryRunner`.
///
/// Cloning shares the same dedup table.
#[derive(Clone)]
pub struct PendingQueryRunner {
    inner: Arc<RunnerInner>,
}

impl PendingQueryRunner {
    /// Runner writing fetched data into `data`.
    #[must_use]
    pub fn new(
        data: Arc<StoreData>,
        network: Arc<dyn NetworkLayer>,
        resolver: RootCallResolver,
        config: RunnerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                data,
                network,
                resolver,
                config,
                state: Mutex::new(RunnerState::default()),
            }),
        }
    }

    /// Number of network fetches still outstanding.
    #[must_use]
    pub fn pending_fetch_count(&self) -> usize {
        self.inner.lock().fetches.len()
    }

    /// Number of callers still waiting for an outcome.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.inner.lock().requests.len()
    }
}

impl QueryRunner for PendingQueryRunner {
    fn run(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        let subqueries = {
            let records = self.inner.data.records();
            queries
                .values()
                .flat_map(|root| diff_root_query(root, &records, &self.inner.resolver))
                .collect()
        };
        self.inner.submit(subqueries, callback, false)
    }

    fn force_fetch(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        let subqueries = queries.values().cloned().collect();
        self.inner.submit(subqueries, callback, true)
    }
}

impl RunnerInner {
    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(self: &Arc<Self>, subqueries: Vec<RootQuery>, callback: FetchCallback, force: bool) -> FetchHandle {
        let mut to_send = Vec::new();
        let request_id;
        let settled_now;
        {
            let mut state = self.lock();
            request_id = state.allocate_request();
            let mut remaining = BTreeSet::new();

            for mut query in subqueries {
                let mut sig = signature(&query);
                if !force && self.config.dedupe_in_flight {
                    let attached = state.attach_in_flight(request_id, &sig, &mut query);
                    if !attached.is_empty() {
                        debug!(fetches = attached.len(), "attached to in-flight fetches");
                        remaining.extend(attached);
                        if query.children.is_empty() {
                            continue;
                        }
                        sig = signature(&query);
                    }
                }

                let fetch_id = state.allocate_fetch();
                let query = Arc::new(query);
                state.fetches.insert(
                    fetch_id,
                    InFlightFetch {
                        query: Arc::clone(&query),
                        signature: sig.clone(),
                        waiters: BTreeSet::from([request_id]),
                    },
                );
                state.by_signature.insert(sig, fetch_id);
                remaining.insert(fetch_id);
                to_send.push((fetch_id, query));
            }

            settled_now = remaining.is_empty();
            if !settled_now {
                state.requests.insert(
                    request_id,
                    PendingRequest {
                        callback: Arc::clone(&callback),
                        remaining,
                    },
                );
            }
        }

        for (fetch_id, query) in to_send {
            self.send(fetch_id, query, force);
        }

        if settled_now {
            debug!("all requested data already cached");
            callback(FetchStatus::Success);
            return FetchHandle::noop();
        }

        let weak = Arc::downgrade(self);
        FetchHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.abort_request(request_id);
            }
        })
    }

    fn send(self: &Arc<Self>, fetch_id: FetchId, query: Arc<RootQuery>, force: bool) {
        debug!(query = %print_root(&query), force, "issuing fetch");
        let weak: Weak<Self> = Arc::downgrade(self);
        let request = QueryRequest::new(query, move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.complete(fetch_id, result);
            }
        });
        self.network.send_query(request);
    }

    fn complete(&self, fetch_id: FetchId, result: QueryResult) {
        let Some(fetch) = self.lock().remove_fetch(fetch_id) else {
            debug!("discarding result of an abandoned fetch");
            return;
        };

        let outcome: StoreResult<()> = result
            .map_err(StoreError::from)
            .and_then(|payload| write_payload(&self.data, &self.resolver, &fetch.query, &payload));
        if let Err(err) = &outcome {
            warn!(query = %print_root(&fetch.query), error = %err, "fetch failed");
        }

        let mut ready = Vec::new();
        {
            let mut state = self.lock();
            for request_id in &fetch.waiters {
                match &outcome {
                    Ok(()) => {
                        let done = match state.requests.get_mut(request_id) {
                            Some(request) => {
                                request.remaining.remove(&fetch_id);
                                request.remaining.is_empty()
                            }
                            None => false,
                        };
                        if done {
                            if let Some(request) = state.requests.remove(request_id) {
                                ready.push((request.callback, FetchStatus::Success));
                            }
                        }
                    }
                    Err(err) => {
                        if let Some(request) = state.requests.remove(request_id) {
                            state.detach(*request_id, &request.remaining);
                            ready.push((request.callback, FetchStatus::Failure(err.clone())));
                        }
                    }
                }
            }
        }

        for (callback, status) in ready {
            callback(status);
        }
    }

    fn abort_request(&self, request_id: RequestId) {
        let request = {
            let mut state = self.lock();
            let Some(request) = state.requests.remove(&request_id) else {
                return;
            };
            state.detach(request_id, &request.remaining);
            request
        };
        debug!("fetch request disposed before completion");
        (request.callback)(FetchStatus::Aborted);
    }
}
