//! Gateway counters, exported as JSON on `/metrics`.

use crate::audit::AuditBroadcaster;
use crate::stats::StatsAggregator;
use std::sync::atomic::{AtomicU64, Ordering};

/// Gateway metrics
#[derive(Default)]
pub struct GatewayMetrics {
    // Admission counters
    pub calls_admitted: AtomicU64,
    pub calls_rejected: AtomicU64,

    // Stream counters
    pub audit_events_sent: AtomicU64,
    pub snapshots_sent: AtomicU64,
    pub stream_delivery_failures: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.calls_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.calls_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit_sent(&self) {
        self.audit_events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_sent(&self) {
        self.snapshots_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.stream_delivery_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics as JSON, including live listener counts.
    pub fn to_json(&self, audit: &AuditBroadcaster, stats: &StatsAggregator) -> serde_json::Value {
        serde_json::json!({
            "calls": {
                "admitted": self.calls_admitted.load(Ordering::Relaxed),
                "rejected": self.calls_rejected.load(Ordering::Relaxed),
            },
            "audit": {
                "listeners": audit.listener_count(),
                "events_published": audit.events_published(),
                "events_sent": self.audit_events_sent.load(Ordering::Relaxed),
                "deliveries_dropped": audit.deliveries_dropped(),
            },
            "stats": {
                "listeners": stats.listener_count(),
                "snapshots_sent": self.snapshots_sent.load(Ordering::Relaxed),
            },
            "stream_delivery_failures": self.stream_delivery_failures.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_json() {
        let metrics = GatewayMetrics::new();
        let audit = AuditBroadcaster::new();
        let stats = StatsAggregator::new();
        let _listener = audit.add_listener();
        stats.add_listener();

        metrics.record_admitted();
        metrics.record_admitted();
        metrics.record_rejected();
        metrics.record_snapshot_sent();

        let json = metrics.to_json(&audit, &stats);
        assert_eq!(json["calls"]["admitted"], 2);
        assert_eq!(json["calls"]["rejected"], 1);
        assert_eq!(json["audit"]["listeners"], 1);
        assert_eq!(json["stats"]["listeners"], 1);
        assert_eq!(json["stats"]["snapshots_sent"], 1);
    }
}
