//! `GraphStore` facade.
//!
//! Wires the record store, resolver, reader and runner together. Components
//! can be injected through [`GraphStoreBuilder`]; anything not injected gets
//! the default implementation.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::data_id::DataId;
use crate::error::{StoreError, StoreResult};
use crate::observe::Observable;
use crate::query::{QueryFilter, QueryNode, QuerySet, RootQuery};
use crate::reader::{QueryTraversal, StoreReader};
use crate::resolver::{RootCallResolver, DEFAULT_IDENTITY_CALLS};
use crate::runner::writer::write_payload;
use crate::runner::{FetchCallback, FetchHandle, PendingQueryRunner, QueryRunner, RunnerConfig};
use crate::storage::{RecordStore, StoreData, StoreSnapshot};
use crate::transport::NetworkLayer;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root calls whose argument is a record id.
    pub identity_root_calls: Vec<String>,
    /// Configuration for the default runner.
    pub runner: RunnerConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            identity_root_calls: DEFAULT_IDENTITY_CALLS.iter().map(|c| (*c).to_string()).collect(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Builder for [`GraphStore`].
#[derive(Default)]
pub struct GraphStoreBuilder {
    config: StoreConfig,
    data: Option<Arc<StoreData>>,
    network: Option<Arc<dyn NetworkLayer>>,
    runner: Option<Arc<dyn QueryRunner>>,
    reader: Option<Arc<dyn StoreReader>>,
}

impl GraphStoreBuilder {
    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Use existing store data, shared with other owners.
    #[must_use]
    pub fn data(mut self, data: Arc<StoreData>) -> Self {
        self.data = Some(data);
        self
    }

    /// Start from a pre-populated record store.
    #[must_use]
    pub fn records(mut self, records: RecordStore) -> Self {
        self.data = Some(Arc::new(StoreData::with_records(records)));
        self
    }

    /// Network layer used by the default runner.
    #[must_use]
    pub fn network(mut self, network: Arc<dyn NetworkLayer>) -> Self {
        self.network = Some(network);
        self
    }

    /// Replace the default runner. The network layer is then optional.
    #[must_use]
    pub fn runner(mut self, runner: Arc<dyn QueryRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Replace the default traversal reader.
    #[must_use]
    pub fn reader(mut self, reader: Arc<dyn StoreReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Build the store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingComponent` when neither a runner nor a
    /// network layer was provided.
    pub fn build(self) -> StoreResult<GraphStore> {
        let data = self.data.unwrap_or_default();
        let resolver = RootCallResolver::new(self.config.identity_root_calls.iter().cloned());

        let runner = match (self.runner, self.network) {
            (Some(runner), _) => runner,
            (None, Some(network)) => Arc::new(PendingQueryRunner::new(
                Arc::clone(&data),
                network,
                resolver.clone(),
                self.config.runner.clone(),
            )),
            (None, None) => {
                return Err(StoreError::MissingComponent {
                    component: "network layer".to_string(),
                })
            }
        };

        Ok(GraphStore {
            data,
            resolver,
            runner,
            reader: self.reader.unwrap_or_else(|| Arc::new(QueryTraversal)),
        })
    }
}

impl fmt::Debug for GraphStoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStoreBuilder")
            .field("config", &self.config)
            .field("has_network", &self.network.is_some())
            .field("has_runner", &self.runner.is_some())
            .field("has_reader", &self.reader.is_some())
            .finish_non_exhaustive()
    }
}

/// Client-side graph store.
pub struct GraphStore {
    data: Arc<StoreData>,
    resolver: RootCallResolver,
    runner: Arc<dyn QueryRunner>,
    reader: Arc<dyn StoreReader>,
}

impl GraphStore {
    /// Start building a store.
    #[must_use]
    pub fn builder() -> GraphStoreBuilder {
        GraphStoreBuilder::default()
    }

    /// Store with the default components on top of `network`.
    #[must_use]
    pub fn new(network: Arc<dyn NetworkLayer>) -> Self {
        let data = Arc::new(StoreData::new());
        let resolver = RootCallResolver::default();
        let runner = Arc::new(PendingQueryRunner::new(
            Arc::clone(&data),
            network,
            resolver.clone(),
            RunnerConfig::default(),
        ));
        Self {
            data,
            resolver,
            runner,
            reader: Arc::new(QueryTraversal),
        }
    }

    /// Fetch whatever part of `queries` is not cached yet.
    pub fn prime_cache(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        self.runner.run(queries, callback)
    }

    /// Fetch `queries` in full, bypassing the cache.
    pub fn force_fetch(&self, queries: Arc<QuerySet>, callback: FetchCallback) -> FetchHandle {
        self.runner.force_fetch(queries, callback)
    }

    /// Read `query` rooted at `data_id`. `None` when the record is unknown.
    #[must_use]
    pub fn read(&self, query: &QueryNode, data_id: &DataId, filter: Option<&QueryFilter>) -> Option<Value> {
        let records = self.data.records();
        self.reader.read(&records, query, data_id, filter)
    }

    /// Read `query` for each id, in order.
    #[must_use]
    pub fn read_all(&self, query: &QueryNode, data_ids: &[DataId], filter: Option<&QueryFilter>) -> Vec<Option<Value>> {
        let records = self.data.records();
        data_ids
            .iter()
            .map(|data_id| self.reader.read(&records, query, data_id, filter))
            .collect()
    }

    /// Resolve a root query to ids and read each of them.
    ///
    /// One entry per argument value; unresolvable arguments yield `None`
    /// without a read.
    #[must_use]
    pub fn read_query(&self, query: &QueryNode, filter: Option<&QueryFilter>) -> Vec<Option<Value>> {
        let Some(root) = query.as_root() else {
            warn!("read_query called with a non-root query node");
            return Vec::new();
        };
        let records = self.data.records();
        self.resolver
            .resolve(root, &records)
            .into_iter()
            .map(|data_id| data_id.and_then(|id| self.reader.read(&records, query, &id, filter)))
            .collect()
    }

    /// Observe `query` rooted at `data_id`.
    #[must_use]
    pub fn observe(
        &self,
        query: Arc<QueryNode>,
        data_id: DataId,
        filter: Option<QueryFilter>,
    ) -> Observable<Option<Value>> {
        self.reader.observe(&self.data, query, data_id, filter)
    }

    /// Observe `query` for each id as one ordered value.
    #[must_use]
    pub fn observe_all(
        &self,
        query: Arc<QueryNode>,
        data_ids: Vec<DataId>,
        filter: Option<QueryFilter>,
    ) -> Observable<Vec<Option<Value>>> {
        self.reader.observe_all(&self.data, query, data_ids, filter)
    }

    /// Write a response obtained outside the runner as one batch.
    ///
    /// # Errors
    ///
    /// Returns a malformed-response error when `payload` does not match
    /// `root`; the store is left untouched in that case.
    pub fn handle_query_payload(&self, root: &RootQuery, payload: &Value) -> StoreResult<()> {
        write_payload(&self.data, &self.resolver, root, payload)
    }

    /// Records and change emitter shared by every component.
    #[must_use]
    pub fn store_data(&self) -> &Arc<StoreData> {
        &self.data
    }

    /// Root call resolver in use.
    #[must_use]
    pub fn resolver(&self) -> &RootCallResolver {
        &self.resolver
    }

    /// Serializable copy of the current records.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.data.snapshot()
    }
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("records", &self.data.records().record_count())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}
