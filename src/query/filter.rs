use std::fmt;
use std::sync::Arc;

use super::node::QueryNode;

/// Caller-supplied predicate pruning which fields and fragments a traversal
/// visits.
///
/// Cloning shares the same predicate; `ptr_eq` tells whether two filters are
/// the same instance.
#[derive(Clone)]
pub struct QueryFilter(Arc<dyn Fn(&QueryNode) -> bool + Send + Sync>);

impl QueryFilter {
    /// Wrap a predicate. Return `false` to skip a node and its subtree.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&QueryNode) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Returns true if the traversal should visit `node`.
    #[must_use]
    pub fn accepts(&self, node: &QueryNode) -> bool {
        (self.0)(node)
    }

    /// True if both handles share one predicate.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryFilter").field(&Arc::as_ptr(&self.0)).finish()
    }
}
