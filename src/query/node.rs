//! Immutable query AST consumed by the reader and runner.
//!
//! Nodes are produced by an external parser. The store traverses them but
//! never mutates or validates them.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Any node of a query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryNode {
    /// A root field such as `nodes(ids: [..])` or `viewer`.
    Root(RootQuery),
    /// A scalar or linked field.
    Field(QueryField),
    /// A named group of fields spread into the enclosing record.
    Fragment(QueryFragment),
}

impl QueryNode {
    /// Child selections of this node.
    #[must_use]
    pub fn children(&self) -> &[QueryNode] {
        match self {
            Self::Root(root) => &root.children,
            Self::Field(field) => &field.children,
            Self::Fragment(fragment) => &fragment.children,
        }
    }

    /// The root query, if this is one.
    #[must_use]
    pub const fn as_root(&self) -> Option<&RootQuery> {
        match self {
            Self::Root(root) => Some(root),
            _ => None,
        }
    }

    /// The field, if this is one.
    #[must_use]
    pub const fn as_field(&self) -> Option<&QueryField> {
        match self {
            Self::Field(field) => Some(field),
            _ => None,
        }
    }

    /// The fragment, if this is one.
    #[must_use]
    pub const fn as_fragment(&self) -> Option<&QueryFragment> {
        match self {
            Self::Fragment(fragment) => Some(fragment),
            _ => None,
        }
    }
}

impl From<RootQuery> for QueryNode {
    fn from(root: RootQuery) -> Self {
        Self::Root(root)
    }
}

impl From<QueryField> for QueryNode {
    fn from(field: QueryField) -> Self {
        Self::Field(field)
    }
}

impl From<QueryFragment> for QueryNode {
    fn from(fragment: QueryFragment) -> Self {
        Self::Fragment(fragment)
    }
}

/// Identifying argument of a root call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallArg {
    /// One value, e.g. `username(zuck)`.
    Single(String),
    /// Several values, e.g. `nodes(ids: [1, 2])`. The response is an array.
    List(Vec<String>),
}

impl CallArg {
    /// A single argument.
    #[must_use]
    pub fn single(value: impl Into<String>) -> Self {
        Self::Single(value.into())
    }

    /// A list argument.
    #[must_use]
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A root-level query field bound to its call argument.
///
/// # Examples
///
/// ```
/// use gqlstore::{CallArg, QueryField, RootQuery};
///
/// let root = RootQuery::new("nodes")
///     .with_arg(CallArg::list(["123", "456"]))
///     .with_child(QueryField::scalar("id"));
///
/// assert_eq!(root.arg_values(), vec![Some("123"), Some("456")]);
/// assert!(root.is_plural());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootQuery {
    /// Operation name, used for logging only.
    pub name: String,
    /// Root field name, e.g. `viewer` or `nodes`.
    pub call_name: String,
    /// Identifying argument, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<CallArg>,
    /// Selections on the root record.
    #[serde(default)]
    pub children: Vec<QueryNode>,
}

impl RootQuery {
    /// Default operation name.
    pub const DEFAULT_NAME: &'static str = "Query";

    /// Root call without argument or selections.
    #[must_use]
    pub fn new(call_name: impl Into<String>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            call_name: call_name.into(),
            arg: None,
            children: Vec::new(),
        }
    }

    /// Set the operation name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the call argument.
    #[must_use]
    pub fn with_arg(mut self, arg: CallArg) -> Self {
        self.arg = Some(arg);
        self
    }

    /// Append one selection.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<QueryNode>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several selections.
    #[must_use]
    pub fn with_children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<QueryNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Argument values in order.
    ///
    /// A root call without an argument, or with a single argument, yields
    /// exactly one entry. A list argument yields one entry per element.
    #[must_use]
    pub fn arg_values(&self) -> Vec<Option<&str>> {
        match &self.arg {
            None => vec![None],
            Some(CallArg::Single(value)) => vec![Some(value.as_str())],
            Some(CallArg::List(values)) => values.iter().map(|v| Some(v.as_str())).collect(),
        }
    }

    /// True if the call argument is a list.
    #[must_use]
    pub const fn is_plural(&self) -> bool {
        matches!(self.arg, Some(CallArg::List(_)))
    }

    /// Copy of this root call narrowed to one argument value and the given
    /// selections.
    ///
    /// A plural call keeps its list shape with a single element so the
    /// response stays an array.
    #[must_use]
    pub fn narrowed(&self, arg: Option<&str>, children: Vec<QueryNode>) -> Self {
        let arg = match (&self.arg, arg) {
            (Some(CallArg::List(_)), Some(value)) => Some(CallArg::List(vec![value.to_string()])),
            (_, Some(value)) => Some(CallArg::Single(value.to_string())),
            (_, None) => None,
        };
        Self {
            name: self.name.clone(),
            call_name: self.call_name.clone(),
            arg,
            children,
        }
    }
}

/// Argument attached to a non-root field, e.g. `first(10)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCall {
    /// Call name, e.g. `first`.
    pub name: String,
    /// Argument value.
    pub value: serde_json::Value,
}

/// A field selection.
///
/// A field without children is a scalar leaf; a field with children is a
/// link (or list of links) to other records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryField {
    /// Schema field name.
    pub name: String,
    /// Response key override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Field arguments, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<FieldCall>,
    /// Selections on the linked record(s). Empty for scalars.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<QueryNode>,
}

impl QueryField {
    /// A scalar leaf field.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            calls: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A linked field with the given child selections.
    #[must_use]
    pub fn linked<I, N>(name: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<QueryNode>,
    {
        Self {
            name: name.into(),
            alias: None,
            calls: Vec::new(),
            children: children.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the response key.
    #[must_use]
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Append a field argument.
    #[must_use]
    pub fn with_call(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.calls.push(FieldCall {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// True if this field selects no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Key under which the field is stored in its record.
    ///
    /// Calls are part of the key so `friends.first(10)` and
    /// `friends.first(20)` are cached independently.
    #[must_use]
    pub fn storage_key(&self) -> String {
        if self.calls.is_empty() {
            return self.name.clone();
        }
        let mut key = self.name.clone();
        for call in &self.calls {
            let _ = write!(key, ".{}({})", call.name, call.value);
        }
        key
    }

    /// Key under which the field appears in responses and read results.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Copy of this field with different children.
    #[must_use]
    pub fn with_replaced_children(&self, children: Vec<QueryNode>) -> Self {
        Self {
            name: self.name.clone(),
            alias: self.alias.clone(),
            calls: self.calls.clone(),
            children,
        }
    }
}

/// Named fragment whose selections apply to the enclosing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFragment {
    /// Fragment name, used for filtering and logging.
    pub name: String,
    /// Selections spread into the enclosing record.
    #[serde(default)]
    pub children: Vec<QueryNode>,
}

impl QueryFragment {
    /// Fragment with the given selections.
    #[must_use]
    pub fn new<I, N>(name: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<QueryNode>,
    {
        Self {
            name: name.into(),
            children: children.into_iter().map(Into::into).collect(),
        }
    }
}
