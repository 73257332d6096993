//! Record identity.
//!
//! Every normalized record is addressed by a `DataId`. Links between records
//! are stored as `DataId`s rather than nested values, so the record graph may
//! contain cycles and a record can be mutated without replacing the values
//! that reference it.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of identifiers generated on the client for records without a
/// server-assigned id.
pub const CLIENT_ID_PREFIX: &str = "client:";

/// Opaque, globally unique record identifier.
///
/// # Examples
///
/// ```
/// use gqlstore::DataId;
///
/// let id = DataId::new("123");
/// assert_eq!(id.as_str(), "123");
/// assert!(!id.is_client_id());
///
/// let viewer = DataId::client("viewer");
/// assert_eq!(viewer.as_str(), "client:viewer");
/// assert!(viewer.is_client_id());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    /// Wraps a server-provided identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds a client-generated identifier from a deterministic key.
    #[must_use]
    pub fn client(key: impl fmt::Display) -> Self {
        Self(format!("{CLIENT_ID_PREFIX}{key}"))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id was generated on the client.
    #[must_use]
    pub fn is_client_id(&self) -> bool {
        self.0.starts_with(CLIENT_ID_PREFIX)
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DataId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for DataId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
