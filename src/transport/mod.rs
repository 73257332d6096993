//! Network transport seam.
//!
//! The runner hands each fetch to a `NetworkLayer` as a `QueryRequest` and is
//! resumed when the request is resolved or rejected, from any thread. A
//! request dropped without being settled is treated as a failed fetch so the
//! runner never waits forever.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use crate::error::TransportError;
use crate::query::print::print_root;
use crate::query::RootQuery;

/// Result of executing one query: the root field's value.
///
/// For a plural root call the payload is an array aligned with the
/// arguments; otherwise it is an object, or `null` when the record does not
/// exist.
pub type QueryResult = Result<serde_json::Value, TransportError>;

type Completion = Box<dyn FnOnce(QueryResult) + Send>;

/// A single fetch awaiting a response.
pub struct QueryRequest {
    query: Arc<RootQuery>,
    completion: Option<Completion>,
}

impl QueryRequest {
    /// Create a request whose settlement calls `completion` once.
    pub fn new<F>(query: Arc<RootQuery>, completion: F) -> Self
    where
        F: FnOnce(QueryResult) + Send + 'static,
    {
        Self {
            query,
            completion: Some(Box::new(completion)),
        }
    }

    /// The query to execute.
    #[must_use]
    pub fn query(&self) -> &RootQuery {
        &self.query
    }

    /// Complete the fetch with the root field's value.
    pub fn resolve(mut self, payload: serde_json::Value) {
        self.settle(Ok(payload));
    }

    /// Fail the fetch.
    pub fn reject(mut self, error: TransportError) {
        self.settle(Err(error));
    }

    /// Complete the fetch with either outcome.
    pub fn settle_with(mut self, result: QueryResult) {
        self.settle(result);
    }

    fn settle(&mut self, result: QueryResult) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }
}

impl Drop for QueryRequest {
    fn drop(&mut self) {
        if self.completion.is_some() {
            warn!(query = %print_root(&self.query), "query request dropped without a response");
            self.settle(Err(TransportError::Aborted));
        }
    }
}

impl fmt::Debug for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("query", &print_root(&self.query))
            .field("settled", &self.completion.is_none())
            .finish()
    }
}

/// Executes queries against the remote schema.
pub trait NetworkLayer: Send + Sync {
    /// Start executing `request`. Must not block on the response.
    fn send_query(&self, request: QueryRequest);
}

/// Network layer that queues requests on a bounded channel.
///
/// A worker (or a test) drains the receiver and settles each request. When
/// the queue is full the request is rejected instead of blocking the caller.
#[derive(Debug)]
pub struct ChannelNetworkLayer {
    tx: Sender<QueryRequest>,
}

impl ChannelNetworkLayer {
    /// Create the layer and the receiving end of its queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<QueryRequest>) {
        let (tx, rx) = bounded::<QueryRequest>(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NetworkLayer for ChannelNetworkLayer {
    fn send_query(&self, request: QueryRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => request.reject(TransportError::ConnectionFailed {
                message: "request queue is full".to_string(),
            }),
            Err(TrySendError::Disconnected(request)) => request.reject(TransportError::ConnectionFailed {
                message: "request queue is closed".to_string(),
            }),
        }
    }
}

/// Network layer that executes each query synchronously with a function.
pub struct FnNetworkLayer<F> {
    execute: F,
}

impl<F> FnNetworkLayer<F>
where
    F: Fn(&RootQuery) -> QueryResult + Send + Sync,
{
    /// Layer calling `execute` for every request.
    pub const fn new(execute: F) -> Self {
        Self { execute }
    }
}

impl<F> NetworkLayer for FnNetworkLayer<F>
where
    F: Fn(&RootQuery) -> QueryResult + Send + Sync,
{
    fn send_query(&self, request: QueryRequest) {
        let result = (self.execute)(request.query());
        request.settle_with(result);
    }
}

impl<F> fmt::Debug for FnNetworkLayer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNetworkLayer").finish_non_exhaustive()
    }
}
