//! Call groups served behind the authorization gate.
//!
//! - `business`: opaque unary calls, handed to a [`BusinessHandler`]
//! - `admin`: the audit and statistics streams, carried over WebSocket
//! - `streams`: transport-agnostic serve loops for the admin streams

pub mod admin;
pub mod business;
pub mod streams;

pub use business::{BusinessHandler, EchoBusiness};
pub use streams::{serve_audit_stream, serve_stats_stream, CallScope, StreamSink};

use crate::audit::AuditBroadcaster;
use crate::domain::error::codes;
use crate::domain::{ApiError, StatsConfig};
use crate::middleware::{Admission, AuthorizationGate, GatewayMetrics};
use crate::service::GatewayState;
use crate::stats::StatsAggregator;
use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub business: Arc<dyn BusinessHandler>,
    pub gate: Arc<AuthorizationGate>,
    pub audit: Arc<AuditBroadcaster>,
    pub stats: Arc<StatsAggregator>,
    pub metrics: Arc<GatewayMetrics>,
    pub stats_config: StatsConfig,
    /// Flips to `true` once the server starts draining
    pub draining: watch::Receiver<bool>,
    pub lifecycle: watch::Receiver<GatewayState>,
    /// Held by every live stream session; the server waits for all clones to
    /// drop before reporting `Stopped`.
    pub sessions: mpsc::Sender<()>,
}

/// Handle an admitted unary business call.
///
/// The body is the call's JSON parameters; an empty body means `null`.
pub async fn handle_business(
    State(state): State<AppState>,
    Extension(admission): Extension<Admission>,
    body: Bytes,
) -> Response {
    let params = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(params) => params,
            Err(e) => return error_response(ApiError::from(e)),
        }
    };

    match state.business.call(&admission, params).await {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!({ "result": result }))).into_response(),
        Err(error) => error_response(error),
    }
}

/// Render an [`ApiError`] as an HTTP response.
pub fn error_response(error: ApiError) -> Response {
    (
        status_for(&error),
        Json(serde_json::json!({ "error": error })),
    )
        .into_response()
}

/// HTTP status used for an error code.
pub fn status_for(error: &ApiError) -> StatusCode {
    match error.code {
        codes::UNAUTHENTICATED => StatusCode::UNAUTHORIZED,
        codes::METHOD_NOT_FOUND => StatusCode::NOT_FOUND,
        codes::PARSE_ERROR | codes::INVALID_REQUEST | codes::INVALID_PARAMS => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ApiError::unauthenticated()),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&ApiError::method_not_found("/x/Y")),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&ApiError::invalid_params("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ApiError::parse_error("eof")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ApiError::new(codes::SERVER_ERROR, "down")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
