//! Serve loops for the administrative streaming calls.
//!
//! Both loops register a listener, relay items to the caller until the call
//! scope is cancelled or a send fails, and unregister the listener on every
//! exit path. They are transport-agnostic: items leave through a
//! [`StreamSink`].

use crate::audit::AuditBroadcaster;
use crate::domain::{AuditEvent, GatewayError, StatSnapshot};
use crate::middleware::GatewayMetrics;
use crate::stats::StatsAggregator;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Outbound half of a streaming call.
#[async_trait]
pub trait StreamSink<T: Sync>: Send {
    /// Deliver one item. An error means the caller is unreachable.
    async fn send(&mut self, item: &T) -> Result<(), GatewayError>;
}

/// Cancellation scope of one streaming call.
///
/// Fires when the caller goes away or the server starts draining. A dropped
/// sender counts as cancellation.
pub struct CallScope {
    client_gone: watch::Receiver<bool>,
    server_draining: watch::Receiver<bool>,
}

impl CallScope {
    pub fn new(client_gone: watch::Receiver<bool>, server_draining: watch::Receiver<bool>) -> Self {
        Self {
            client_gone,
            server_draining,
        }
    }

    /// Resolve once the scope is cancelled.
    pub async fn cancelled(&mut self) {
        tokio::select! {
            _ = wait_true(&mut self.client_gone) => {}
            _ = wait_true(&mut self.server_draining) => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.client_gone.borrow() || *self.server_draining.borrow()
    }
}

async fn wait_true(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|flag| *flag).await;
}

/// Relay audit events to `sink` until cancellation or delivery failure.
pub async fn serve_audit_stream<S>(
    audit: &AuditBroadcaster,
    sink: &mut S,
    scope: &mut CallScope,
    metrics: &GatewayMetrics,
) -> Result<(), GatewayError>
where
    S: StreamSink<AuditEvent>,
{
    let (mut events, listener_id) = audit.add_listener();

    let outcome = loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break Ok(()),
            next = events.recv() => match next {
                Some(event) => {
                    if let Err(e) = sink.send(event.as_ref()).await {
                        metrics.record_delivery_failure();
                        break Err(e);
                    }
                    metrics.record_audit_sent();
                }
                // Unregistered from outside the loop.
                None => break Ok(()),
            },
        }
    };

    audit.remove_listener(listener_id);
    debug!(listener_id = %listener_id, ok = outcome.is_ok(), "Audit stream finished");
    outcome
}

/// Drain and relay statistics every `period` until cancellation or delivery
/// failure. The first snapshot is sent one full period after registration.
pub async fn serve_stats_stream<S>(
    stats: &StatsAggregator,
    period: Duration,
    sink: &mut S,
    scope: &mut CallScope,
    metrics: &GatewayMetrics,
) -> Result<(), GatewayError>
where
    S: StreamSink<StatSnapshot>,
{
    let listener_id = stats.add_listener();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break Ok(()),
            _ = ticker.tick() => {
                let Some(snapshot) = stats.drain(listener_id) else {
                    break Ok(());
                };
                if let Err(e) = sink.send(&snapshot).await {
                    metrics.record_delivery_failure();
                    break Err(e);
                }
                metrics.record_snapshot_sent();
            }
        }
    };

    stats.remove_listener(listener_id);
    debug!(listener_id = %listener_id, ok = outcome.is_ok(), "Statistics stream finished");
    outcome
}
