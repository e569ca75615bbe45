//! Per-call correlation id.
//!
//! Every admitted call is tagged with a UUID v7 so the log lines of its
//! serving task (including a long-lived stream) can be grouped together.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new time-ordered id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Reuse a caller-supplied id when it is a valid UUID, otherwise mint one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::parse(v.trim()).ok())
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
