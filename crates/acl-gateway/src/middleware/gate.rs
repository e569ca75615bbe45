//! Authorization gate.
//!
//! The single admission check every call passes through, unary calls and
//! stream initiations alike. A rejected call leaves no trace in the audit
//! stream or the statistics; an admitted call is published and recorded
//! before its handler runs.

use crate::audit::AuditBroadcaster;
use crate::domain::{call_group, Acl, ApiError, ApiResult, AuditEvent, CorrelationId};
use crate::middleware::GatewayMetrics;
use crate::stats::StatsAggregator;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the transport knows about an inbound call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Value of the consumer identity metadata field
    pub consumer: Option<String>,
    /// Full method name
    pub method: String,
    /// Peer address, if the transport exposes it
    pub peer: Option<SocketAddr>,
    /// Caller-supplied correlation id
    pub call_id: Option<String>,
}

impl CallContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }
}

/// Record of an admitted call, handed to the wrapped handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub consumer: String,
    pub method: String,
    pub call_id: CorrelationId,
}

/// ACL check plus audit/statistics side effects.
#[derive(Clone)]
pub struct AuthorizationGate {
    acl: Arc<Acl>,
    audit: Arc<AuditBroadcaster>,
    stats: Arc<StatsAggregator>,
    metrics: Arc<GatewayMetrics>,
}

impl AuthorizationGate {
    pub fn new(
        acl: Arc<Acl>,
        audit: Arc<AuditBroadcaster>,
        stats: Arc<StatsAggregator>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            acl,
            audit,
            stats,
            metrics,
        }
    }

    /// Admit or reject a call.
    ///
    /// On success the audit event has been handed to every audit listener and
    /// the call counted by every statistics listener.
    pub fn admit(&self, call: CallContext) -> ApiResult<Admission> {
        let consumer = match call.consumer {
            Some(consumer) if !consumer.is_empty() => consumer,
            _ => {
                self.metrics.record_rejected();
                warn!(method = %call.method, "Call rejected: missing consumer identity");
                return Err(ApiError::unauthenticated());
            }
        };

        if !self.acl.permits(&consumer, &call.method) {
            self.metrics.record_rejected();
            warn!(
                consumer = %consumer,
                method = %call.method,
                "Call rejected by ACL"
            );
            return Err(ApiError::unauthenticated());
        }

        let mut event = AuditEvent::new(consumer.clone(), call.method.clone());
        event.host = call.peer.map(|peer| peer.to_string());

        self.audit.publish(event);
        self.stats.record(&call.method, &consumer);
        self.metrics.record_admitted();

        let call_id = CorrelationId::from_header(call.call_id.as_deref());
        debug!(
            consumer = %consumer,
            method = %call.method,
            group = ?call_group(&call.method),
            call_id = %call_id,
            "Call admitted"
        );

        Ok(Admission {
            consumer,
            method: call.method,
            call_id,
        })
    }

    pub fn acl(&self) -> &Acl {
        &self.acl
    }
}
