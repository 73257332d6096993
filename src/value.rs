//! Field values held by normalized records.
//!
//! A record field is a scalar, an explicit `null`, a link to another record,
//! or an ordered list of links. A field that was never fetched has no
//! `FieldValue` at all; absence is represented by `Option::None` at the
//! call site, never by `FieldValue::Null`.

use serde::{Deserialize, Serialize};

use crate::data_id::DataId;

/// A single stored field value.
///
/// # Examples
///
/// ```
/// use gqlstore::{DataId, FieldValue};
///
/// let name = FieldValue::scalar("Zuck");
/// let friend = FieldValue::Link(DataId::new("4"));
///
/// assert!(name.is_scalar());
/// assert_eq!(friend.as_link().map(DataId::as_str), Some("4"));
/// assert!(FieldValue::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Any non-null JSON value.
    Scalar(serde_json::Value),
    /// The server returned `null` for this field.
    Null,
    /// Reference to another record.
    Link(DataId),
    /// Ordered references to other records.
    LinkedList(Vec<DataId>),
}

impl FieldValue {
    /// Wraps anything convertible to JSON as a scalar.
    ///
    /// A JSON `null` is normalized to `FieldValue::Null`.
    #[must_use]
    pub fn scalar(value: impl Into<serde_json::Value>) -> Self {
        match value.into() {
            serde_json::Value::Null => Self::Null,
            other => Self::Scalar(other),
        }
    }

    /// True for a non-null scalar.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    /// True for an explicit `null`, not for an absent field.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for a singular link.
    #[must_use]
    pub const fn is_link(&self) -> bool {
        matches!(self, Self::Link(_))
    }

    /// True for a plural link.
    #[must_use]
    pub const fn is_linked_list(&self) -> bool {
        matches!(self, Self::LinkedList(_))
    }

    /// The scalar JSON value, if this is a scalar.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// The linked record id, if this is a singular link.
    #[must_use]
    pub const fn as_link(&self) -> Option<&DataId> {
        match self {
            Self::Link(id) => Some(id),
            _ => None,
        }
    }

    /// The linked record ids, if this is a plural link.
    #[must_use]
    pub fn as_linked_list(&self) -> Option<&[DataId]> {
        match self {
            Self::LinkedList(ids) => Some(ids),
            _ => None,
        }
    }
}

impl From<DataId> for FieldValue {
    fn from(id: DataId) -> Self {
        Self::Link(id)
    }
}

impl From<Vec<DataId>> for FieldValue {
    fn from(ids: Vec<DataId>) -> Self {
        Self::LinkedList(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_null_normalizes() {
        assert_eq!(FieldValue::scalar(serde_json::Value::Null), FieldValue::Null);
        assert_eq!(FieldValue::scalar(3), FieldValue::Scalar(serde_json::json!(3)));
    }

    #[test]
    fn test_accessors() {
        let list = FieldValue::from(vec![DataId::new("1"), DataId::new("2")]);
        assert!(list.is_linked_list());
        assert_eq!(list.as_linked_list().map(<[DataId]>::len), Some(2));
        assert!(list.as_link().is_none());
        assert!(!list.is_null());
    }

    #[test]
    fn test_serialization_tags() {
        let v = FieldValue::Link(DataId::new("4"));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json, serde_json::json!({"type": "link", "value": "4"}));
        let back: FieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }
}
