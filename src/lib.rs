//! # gqlstore - a normalized client-side store for graph query results
//!
//! gqlstore keeps the results of graph queries as a flat set of records keyed
//! by id, rebuilds query-shaped results from those records, fetches only the
//! data that is not cached yet, and tells observers when the data they read
//! changes.
//!
//! ## Core Concepts
//!
//! - **Record**: A flat map of field storage keys to scalars or links, keyed by a `DataId`
//! - **Root call**: A top-level query field (`viewer`, `node(4)`) resolved to a record id
//! - **Query runner**: Fetch orchestration with in-flight deduplication and abort on dispose
//! - **Observable**: A live read that re-notifies when a write batch changes its result
//!
//! ## Usage
//!
//! ```rust
//! use gqlstore::{CallArg, DataId, FieldValue, QueryField, RecordState, RecordStore, RootQuery};
//!
//! let mut records = RecordStore::new();
//! records.put_field(&DataId::new("4"), "name", FieldValue::scalar("Zuck"));
//! assert_eq!(records.get_record_state(&DataId::new("4")), RecordState::Existent);
//!
//! let query = RootQuery::new("node")
//!     .with_arg(CallArg::single("4"))
//!     .with_child(QueryField::scalar("name"));
//! assert_eq!(query.arg_values(), vec![Some("4")]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Core types
pub mod data_id;
pub mod error;
pub mod query;
pub mod value;

// Storage and reads
pub mod reader;
pub mod resolver;
pub mod storage;

// Observation
pub mod observe;

// Fetching
pub mod runner;
pub mod transport;

// Facade
pub mod store;

// Re-export primary types at crate root for convenience
pub use data_id::DataId;
pub use error::{StoreError, StoreResult, TransportError};
pub use query::{CallArg, QueryField, QueryFilter, QueryFragment, QueryNode, QuerySet, RootQuery};
pub use value::FieldValue;

pub use observe::{ListenerId, ObservationStream, Observable};
pub use reader::{QueryTraversal, StoreReader, DATA_ID_KEY};
pub use resolver::RootCallResolver;
pub use runner::{FetchCallback, FetchHandle, FetchStatus, PendingQueryRunner, QueryRunner, RunnerConfig};
pub use storage::{RecordState, RecordStore, StoreData, StoreSnapshot, WriteBatch};
pub use store::{GraphStore, GraphStoreBuilder, StoreConfig};
pub use transport::{ChannelNetworkLayer, FnNetworkLayer, NetworkLayer, QueryRequest, QueryResult};
