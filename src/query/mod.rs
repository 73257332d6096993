//! Query AST, filters and canonical printing.

mod filter;
mod node;
pub mod print;

pub use filter::QueryFilter;
pub use node::{CallArg, FieldCall, QueryField, QueryFragment, QueryNode, RootQuery};

use std::collections::BTreeMap;

/// Named root queries submitted together to the runner.
pub type QuerySet = BTreeMap<String, RootQuery>;
