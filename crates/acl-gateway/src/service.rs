//! Gateway server - lifecycle and routing.
//!
//! States move strictly forward: `Created → Listening → Draining → Stopped`.
//! Setup failures (malformed ACL, invalid configuration, bind error) are
//! returned to the caller before `Listening` is ever reached.

use crate::audit::AuditBroadcaster;
use crate::domain::methods::{SUBSCRIBE_AUDIT, SUBSCRIBE_STATISTICS};
use crate::domain::{Acl, GatewayConfig, GatewayError};
use crate::middleware::{AuthLayer, AuthorizationGate, GatewayMetrics};
use crate::rpc::{admin, handle_business, AppState, BusinessHandler, EchoBusiness};
use crate::stats::StatsAggregator;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::fmt;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Lifecycle state of a gateway server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    /// ACL parsed, components built, socket not yet bound
    Created,
    /// Accepting calls
    Listening,
    /// No longer accepting calls; open streams are being ended
    Draining,
    /// Terminal
    Stopped,
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GatewayState::Created => "created",
            GatewayState::Listening => "listening",
            GatewayState::Draining => "draining",
            GatewayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Gateway server in the `Created` state
pub struct GatewayServer {
    config: GatewayConfig,
    business: Arc<dyn BusinessHandler>,
    gate: Arc<AuthorizationGate>,
    audit: Arc<AuditBroadcaster>,
    stats: Arc<StatsAggregator>,
    metrics: Arc<GatewayMetrics>,
    state_tx: watch::Sender<GatewayState>,
}

impl GatewayServer {
    /// Build a server from its configuration and a serialized ACL table.
    pub fn new(
        config: GatewayConfig,
        acl_json: &str,
        business: Arc<dyn BusinessHandler>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;

        let acl = Acl::from_json(acl_json)?;
        info!(consumers = acl.len(), "ACL loaded");

        let audit = Arc::new(AuditBroadcaster::new());
        let stats = Arc::new(StatsAggregator::new());
        let metrics = Arc::new(GatewayMetrics::new());
        let gate = Arc::new(AuthorizationGate::new(
            Arc::new(acl),
            Arc::clone(&audit),
            Arc::clone(&stats),
            Arc::clone(&metrics),
        ));
        let (state_tx, _) = watch::channel(GatewayState::Created);

        Ok(Self {
            config,
            business,
            gate,
            audit,
            stats,
            metrics,
            state_tx,
        })
    }

    pub fn state(&self) -> GatewayState {
        *self.state_tx.borrow()
    }

    /// Bind the listening socket and start serving.
    ///
    /// Returns once the server is `Listening`. Shutdown begins when
    /// `shutdown` becomes `true` or its sender is dropped.
    pub async fn start(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<GatewayHandle, GatewayError> {
        let addr = self.config.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let (draining_tx, draining_rx) = watch::channel(false);
        let (sessions_tx, sessions_rx) = mpsc::channel(1);
        let app_state = AppState {
            business: self.business,
            gate: self.gate,
            audit: self.audit,
            stats: self.stats,
            metrics: self.metrics,
            stats_config: self.config.stats.clone(),
            draining: draining_rx,
            lifecycle: self.state_tx.subscribe(),
            sessions: sessions_tx,
        };
        let router = build_router(app_state);

        self.state_tx.send_replace(GatewayState::Listening);
        info!(addr = %local_addr, state = %GatewayState::Listening, "Gateway listening");

        let state_rx = self.state_tx.subscribe();
        let task = tokio::spawn(serve(
            listener,
            router,
            shutdown,
            Lifecycle {
                state_tx: self.state_tx,
                draining_tx,
                sessions_rx,
                drain_timeout: self.config.shutdown.drain_timeout,
            },
        ));

        Ok(GatewayHandle {
            local_addr,
            state_rx,
            task,
        })
    }
}

/// Start a gateway on `addr` with default settings and the sample business
/// methods.
pub async fn start_gateway(
    shutdown: watch::Receiver<bool>,
    addr: SocketAddr,
    acl_json: &str,
) -> Result<GatewayHandle, GatewayError> {
    let config = GatewayConfig {
        listen: addr,
        ..GatewayConfig::default()
    };
    GatewayServer::new(config, acl_json, Arc::new(EchoBusiness::new()))?
        .start(shutdown)
        .await
}

/// Handle to a running gateway
pub struct GatewayHandle {
    local_addr: SocketAddr,
    state_rx: watch::Receiver<GatewayState>,
    task: JoinHandle<Result<(), GatewayError>>,
}

impl GatewayHandle {
    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> GatewayState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GatewayState> {
        self.state_rx.clone()
    }

    /// Wait until the server is `Stopped`.
    pub async fn stopped(self) -> Result<(), GatewayError> {
        self.task
            .await
            .map_err(|e| GatewayError::Internal(format!("serving task failed: {}", e)))?
    }
}

struct Lifecycle {
    state_tx: watch::Sender<GatewayState>,
    draining_tx: watch::Sender<bool>,
    sessions_rx: mpsc::Receiver<()>,
    drain_timeout: Duration,
}

impl Lifecycle {
    fn enter(&self, state: GatewayState) {
        self.state_tx.send_replace(state);
        info!(state = %state, "Gateway state changed");
    }
}

async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
    mut lifecycle: Lifecycle,
) -> Result<(), GatewayError> {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        })
        .into_future(),
    );

    tokio::select! {
        _ = shutdown_requested(&mut shutdown) => {}
        result = &mut server => {
            error!("Server exited before shutdown was requested");
            lifecycle.enter(GatewayState::Stopped);
            return flatten(result);
        }
    }

    lifecycle.enter(GatewayState::Draining);
    let _ = lifecycle.draining_tx.send(true);
    let _ = stop_tx.send(());

    let sessions_rx = &mut lifecycle.sessions_rx;
    let drained = tokio::time::timeout(lifecycle.drain_timeout, async {
        let served = (&mut server).await;
        // Every stream session holds a sender.
        while sessions_rx.recv().await.is_some() {}
        served
    })
    .await;

    let outcome = match drained {
        Ok(result) => flatten(result),
        Err(_) => {
            warn!(
                timeout = ?lifecycle.drain_timeout,
                "Drain timeout elapsed, abandoning in-flight calls"
            );
            server.abort();
            Ok(())
        }
    };

    lifecycle.enter(GatewayState::Stopped);
    outcome
}

/// Resolves when shutdown is requested or the requesting side is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|requested| *requested).await;
}

fn flatten(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), GatewayError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GatewayError::Serve(e.to_string())),
        Err(e) => Err(GatewayError::Serve(e.to_string())),
    }
}

/// Routes of both call groups sit behind the gate; `/health` and `/metrics`
/// do not.
fn build_router(state: AppState) -> Router {
    let gate = Arc::clone(&state.gate);
    Router::new()
        .route(SUBSCRIBE_AUDIT, get(admin::subscribe_audit))
        .route(SUBSCRIBE_STATISTICS, get(admin::subscribe_statistics))
        .route("/:service/:method", post(handle_business))
        .route_layer(AuthLayer::new(gate))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_export))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let lifecycle = *state.lifecycle.borrow();
    Json(serde_json::json!({
        "status": "ok",
        "state": lifecycle,
        "consumers": state.gate.acl().len(),
    }))
}

async fn metrics_export(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.to_json(&state.audit, &state.stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ShutdownConfig;

    const ACL: &str = r#"{"biz_user": ["/gateway.Biz/*"]}"#;

    fn local_config() -> GatewayConfig {
        GatewayConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            shutdown: ShutdownConfig {
                drain_timeout: Duration::from_secs(2),
            },
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_malformed_acl_is_fatal() {
        let result = GatewayServer::new(local_config(), "{not json", Arc::new(EchoBusiness));
        assert!(matches!(result, Err(GatewayError::Acl(_))));

        let result = GatewayServer::new(
            local_config(),
            r#"{"alice": [1, 2]}"#,
            Arc::new(EchoBusiness),
        );
        assert!(matches!(result, Err(GatewayError::Acl(_))));
    }

    #[test]
    fn test_new_server_is_created() {
        let server = GatewayServer::new(local_config(), ACL, Arc::new(EchoBusiness)).unwrap();
        assert_eq!(server.state(), GatewayState::Created);
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);

        let result = start_gateway(rx, addr, ACL).await;
        assert!(matches!(result, Err(GatewayError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let server = GatewayServer::new(local_config(), ACL, Arc::new(EchoBusiness)).unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = server.start(rx).await.unwrap();
        assert_eq!(handle.state(), GatewayState::Listening);
        assert_ne!(handle.local_addr().port(), 0);

        let mut states = handle.subscribe_state();
        tx.send(true).unwrap();

        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            seen.push(state);
            if state == GatewayState::Stopped {
                break;
            }
        }
        assert_eq!(seen.last(), Some(&GatewayState::Stopped));
        assert!(handle.stopped().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_server() {
        let (tx, rx) = watch::channel(false);
        let handle = start_gateway(rx, "127.0.0.1:0".parse().unwrap(), ACL)
            .await
            .unwrap();
        drop(tx);

        let states = handle.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), handle.stopped())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*states.borrow(), GatewayState::Stopped);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GatewayState::Draining.to_string(), "draining");
        assert_eq!(
            serde_json::to_value(GatewayState::Listening).unwrap(),
            "listening"
        );
    }
}
