//! Administrative streaming calls over WebSocket.
//!
//! Both calls arrive as upgrade requests that already passed the gate. Each
//! open stream is a session: a sink that writes JSON text frames, a reader
//! task that notices when the client goes away, and a [`CallScope`] that also
//! fires when the server drains.

use crate::domain::{ApiError, ApiResult, GatewayError, StatsConfig};
use crate::middleware::Admission;
use crate::rpc::streams::{serve_audit_stream, serve_stats_stream, CallScope, StreamSink};
use crate::rpc::{error_response, AppState};
use async_trait::async_trait;
use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Extension, Query, State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Query parameters of the statistics stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsParams {
    /// Seconds between snapshots
    pub interval_seconds: Option<u64>,
}

/// Resolve the snapshot period requested by a subscriber.
pub fn stats_period(params: &StatsParams, config: &StatsConfig) -> ApiResult<Duration> {
    let seconds = params
        .interval_seconds
        .unwrap_or(config.default_interval_seconds);

    if seconds == 0 || seconds > config.max_interval_seconds {
        return Err(ApiError::invalid_params(format!(
            "interval_seconds must be within 1..={}",
            config.max_interval_seconds
        )));
    }

    Ok(Duration::from_secs(seconds))
}

/// `GET /gateway.Admin/SubscribeAudit`
pub async fn subscribe_audit(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(e) => return error_response(ApiError::invalid_request(e.body_text())),
    };

    upgrade.on_upgrade(move |socket| audit_session(state, admission, socket))
}

/// `GET /gateway.Admin/SubscribeStatistics?interval_seconds=N`
pub async fn subscribe_statistics(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    params: Result<Query<StatsParams>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let period = match params
        .map_err(|e| ApiError::invalid_params(e.body_text()))
        .and_then(|Query(params)| stats_period(&params, &state.stats_config))
    {
        Ok(period) => period,
        Err(error) => return error_response(error),
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(e) => return error_response(ApiError::invalid_request(e.body_text())),
    };

    upgrade.on_upgrade(move |socket| stats_session(state, admission, period, socket))
}

async fn audit_session(state: AppState, admission: Admission, socket: WebSocket) {
    let span = info_span!(
        "audit_stream",
        consumer = %admission.consumer,
        call_id = %admission.call_id
    );

    async move {
        let mut session = Session::open(socket, &state.draining);
        info!("Audit stream opened");
        let outcome = serve_audit_stream(
            &state.audit,
            &mut session.sink,
            &mut session.scope,
            &state.metrics,
        )
        .await;
        session.close(outcome).await;
    }
    .instrument(span)
    .await
}

async fn stats_session(state: AppState, admission: Admission, period: Duration, socket: WebSocket) {
    let span = info_span!(
        "stats_stream",
        consumer = %admission.consumer,
        call_id = %admission.call_id,
        interval_seconds = period.as_secs()
    );

    async move {
        let mut session = Session::open(socket, &state.draining);
        info!("Statistics stream opened");
        let outcome = serve_stats_stream(
            &state.stats,
            period,
            &mut session.sink,
            &mut session.scope,
            &state.metrics,
        )
        .await;
        session.close(outcome).await;
    }
    .instrument(span)
    .await
}

/// Sink writing each item as one JSON text frame.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl<T: Serialize + Sync> StreamSink<T> for WsSink {
    async fn send(&mut self, item: &T) -> Result<(), GatewayError> {
        let text =
            serde_json::to_string(item).map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| GatewayError::Delivery(e.to_string()))
    }
}

struct Session {
    sink: WsSink,
    scope: CallScope,
    reader: JoinHandle<()>,
}

impl Session {
    fn open(socket: WebSocket, draining: &watch::Receiver<bool>) -> Self {
        let (sink, stream) = socket.split();
        let (gone_tx, gone_rx) = watch::channel(false);
        let reader = tokio::spawn(watch_for_close(stream, gone_tx));

        Self {
            sink: WsSink { inner: sink },
            scope: CallScope::new(gone_rx, draining.clone()),
            reader,
        }
    }

    async fn close(mut self, outcome: Result<(), GatewayError>) {
        self.reader.abort();
        match outcome {
            Ok(()) => {
                // Client may already be gone.
                let _ = self.sink.inner.close().await;
                info!("Stream closed");
            }
            Err(e) => warn!(error = %e, "Stream ended: caller unreachable"),
        }
    }
}

/// Read inbound frames until the client closes the connection.
///
/// Streams are one-way; anything the client sends besides a close is ignored.
async fn watch_for_close(mut stream: SplitStream<WebSocket>, gone: watch::Sender<bool>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "WebSocket read failed");
                break;
            }
        }
    }
    let _ = gone.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::codes;

    fn config() -> StatsConfig {
        StatsConfig {
            default_interval_seconds: 2,
            max_interval_seconds: 60,
        }
    }

    #[test]
    fn test_stats_period_default() {
        let period = stats_period(&StatsParams::default(), &config()).unwrap();
        assert_eq!(period, Duration::from_secs(2));
    }

    #[test]
    fn test_stats_period_requested() {
        let params = StatsParams {
            interval_seconds: Some(60),
        };
        assert_eq!(
            stats_period(&params, &config()).unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_stats_period_out_of_range() {
        for seconds in [0, 61] {
            let params = StatsParams {
                interval_seconds: Some(seconds),
            };
            let err = stats_period(&params, &config()).unwrap_err();
            assert_eq!(err.code, codes::INVALID_PARAMS);
        }
    }
}
