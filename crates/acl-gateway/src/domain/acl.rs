//! Per-consumer access control list.
//!
//! The table maps a consumer identity to an ordered list of method patterns.
//! A pattern is either an exact method path (`/gateway.Biz/Check`) or a prefix
//! terminated by [`WILDCARD`] (`/gateway.Biz/*`). The table is parsed once at
//! startup and never mutated afterwards, so lookups need no synchronization.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker that turns a pattern into a prefix match.
pub const WILDCARD: char = '*';

/// Immutable ACL table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Acl {
    entries: HashMap<String, Vec<String>>,
}

impl Acl {
    /// Build a table from `(consumer, patterns)` pairs.
    pub fn new<I, C, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, Vec<P>)>,
        C: Into<String>,
        P: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(consumer, patterns)| {
                    (
                        consumer.into(),
                        patterns.into_iter().map(Into::into).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Parse the serialized `{"consumer": ["pattern", ...]}` form.
    pub fn from_json(data: &str) -> Result<Self, AclError> {
        serde_json::from_str(data).map_err(|e| AclError::Malformed(e.to_string()))
    }

    /// Patterns granted to `consumer`, in table order.
    pub fn patterns(&self, consumer: &str) -> Option<&[String]> {
        self.entries.get(consumer).map(Vec::as_slice)
    }

    /// Number of consumers in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shorthand for [`permitted`] against this table.
    pub fn permits(&self, consumer: &str, method: &str) -> bool {
        permitted(self, consumer, method)
    }
}

/// Decide whether `consumer` may invoke `method`.
///
/// Unknown consumers are denied. Any matching pattern grants access; patterns
/// carry no precedence over each other.
pub fn permitted(acl: &Acl, consumer: &str, method: &str) -> bool {
    let Some(patterns) = acl.patterns(consumer) else {
        return false;
    };

    patterns
        .iter()
        .any(|pattern| pattern_matches(pattern, method))
}

fn pattern_matches(pattern: &str, method: &str) -> bool {
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => method.starts_with(prefix),
        None => pattern == method,
    }
}

/// ACL loading errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AclError {
    /// The serialized table is not a consumer → pattern-list object
    #[error("malformed ACL table: {0}")]
    Malformed(String),
}
