//! Root call resolution.
//!
//! Maps a root field and its argument values to record ids. Identity calls
//! (`node`, `nodes` by default) take record ids as arguments. Every other
//! call goes through the root call map filled in when root responses are
//! normalized or registered explicitly.

use std::collections::HashSet;

use tracing::warn;

use crate::data_id::DataId;
use crate::query::RootQuery;
use crate::storage::RecordStore;

/// Root calls whose argument is the record id itself.
pub const DEFAULT_IDENTITY_CALLS: [&str; 2] = ["node", "nodes"];

/// Resolves root calls to record ids.
#[derive(Debug, Clone)]
pub struct RootCallResolver {
    identity_calls: HashSet<String>,
}

impl Default for RootCallResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CALLS)
    }
}

impl RootCallResolver {
    /// Resolver treating `identity_calls` as id lookups.
    #[must_use]
    pub fn new<I, S>(identity_calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity_calls: identity_calls.into_iter().map(Into::into).collect(),
        }
    }

    /// True if `call_name` takes record ids as its argument.
    #[must_use]
    pub fn is_identity_call(&self, call_name: &str) -> bool {
        self.identity_calls.contains(call_name)
    }

    /// Resolve one argument value without logging misses.
    #[must_use]
    pub fn resolve_arg(&self, call_name: &str, arg: Option<&str>, records: &RecordStore) -> Option<DataId> {
        if self.is_identity_call(call_name) {
            return arg.map(DataId::from);
        }
        records.get_data_id(call_name, arg).cloned()
    }

    /// Resolve every argument value of `root`, in argument order.
    ///
    /// Unresolvable values yield `None`; callers must not read or fetch on
    /// their behalf.
    #[must_use]
    pub fn resolve(&self, root: &RootQuery, records: &RecordStore) -> Vec<Option<DataId>> {
        root.arg_values()
            .into_iter()
            .map(|arg| {
                let resolved = self.resolve_arg(&root.call_name, arg, records);
                if resolved.is_none() {
                    warn!(
                        query = %root.name,
                        call = %root.call_name,
                        arg = ?arg,
                        "unrecognized root call; yielding empty result"
                    );
                }
                resolved
            })
            .collect()
    }
}
