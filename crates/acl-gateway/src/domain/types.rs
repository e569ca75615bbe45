//! Records exchanged between the gate, the broadcaster, the aggregator and
//! the administrative streams.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle identifying a registered audit or statistics listener.
///
/// Handles are allocated from a monotonically increasing counter and are
/// never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One authorized call, as seen by audit subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Identity asserted by the caller
    pub consumer: String,
    /// Full method name
    pub method: String,
    /// Peer address, when the transport exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl AuditEvent {
    pub fn new(consumer: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            method: method.into(),
            host: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// Counters accumulated by one statistics listener since its last drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub by_consumer: HashMap<String, u64>,
    pub by_method: HashMap<String, u64>,
}

impl StatSnapshot {
    pub fn is_empty(&self) -> bool {
        self.by_consumer.is_empty() && self.by_method.is_empty()
    }

    /// Total number of calls in this snapshot.
    pub fn total_calls(&self) -> u64 {
        self.by_method.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_host_is_optional_on_the_wire() {
        let event = AuditEvent::new("alice", "/svc/Foo");
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("host").is_none());

        let event = event.with_host("127.0.0.1:5000");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["host"], "127.0.0.1:5000");

        let parsed: AuditEvent =
            serde_json::from_str(r#"{"consumer":"bob","method":"/svc/Bar"}"#).unwrap();
        assert_eq!(parsed.host, None);
    }

    #[test]
    fn test_snapshot_totals() {
        let mut snapshot = StatSnapshot::default();
        assert!(snapshot.is_empty());
        snapshot.by_method.insert("/svc/Foo".into(), 3);
        snapshot.by_method.insert("/svc/Bar".into(), 2);
        assert_eq!(snapshot.total_calls(), 5);
    }

    #[test]
    fn test_listener_id_display() {
        assert_eq!(ListenerId::new(42).to_string(), "42");
    }
}
