//! Tower decorator that puts the [`AuthorizationGate`] in front of a service.
//!
//! Every request reaching the wrapped service has been admitted; the
//! [`Admission`] record is attached as a request extension. Streaming calls are
//! WebSocket upgrades and therefore pass through here exactly once, at open.

use crate::domain::ApiError;
use crate::middleware::gate::{Admission, AuthorizationGate, CallContext};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderValue, Request, StatusCode},
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, Service};

/// Metadata field carrying the consumer identity
pub const CONSUMER_HEADER: &str = "consumer";

/// Optional caller-supplied correlation id
pub const CALL_ID_HEADER: &str = "x-call-id";

/// Authorization layer
#[derive(Clone)]
pub struct AuthLayer {
    gate: Arc<AuthorizationGate>,
}

impl AuthLayer {
    pub fn new(gate: Arc<AuthorizationGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

/// Authorization service
#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    gate: Arc<AuthorizationGate>,
}

impl<S> Service<Request<Body>> for AuthService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match gate.admit(call_context(&req)) {
                Ok(admission) => {
                    req.extensions_mut().insert(admission);
                    inner.call(req).await
                }
                Err(error) => Ok(unauthenticated_response(&error)),
            }
        })
    }
}

/// Build the gate's view of an HTTP request.
pub fn call_context<B>(req: &Request<B>) -> CallContext {
    let header_str = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    CallContext {
        consumer: header_str(CONSUMER_HEADER),
        method: req.uri().path().to_string(),
        peer: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0),
        call_id: header_str(CALL_ID_HEADER),
    }
}

/// Admission record of a request that passed the gate.
pub fn admission<B>(req: &Request<B>) -> Option<&Admission> {
    req.extensions().get::<Admission>()
}

fn unauthenticated_response(error: &ApiError) -> Response {
    let body = serde_json::json!({ "error": error });

    let mut response = Response::new(Body::from(serde_json::to_vec(&body).unwrap_or_default()));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(CONSUMER_HEADER));

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditBroadcaster;
    use crate::domain::Acl;
    use crate::middleware::GatewayMetrics;
    use crate::stats::StatsAggregator;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    fn gate() -> Arc<AuthorizationGate> {
        let acl = Acl::from_json(r#"{"alice": ["/svc/*"]}"#).unwrap();
        Arc::new(AuthorizationGate::new(
            Arc::new(acl),
            Arc::new(AuditBroadcaster::new()),
            Arc::new(StatsAggregator::new()),
            Arc::new(GatewayMetrics::new()),
        ))
    }

    #[test]
    fn test_call_context_from_request() {
        let mut req = Request::builder()
            .uri("/svc/Foo?x=1")
            .header(CONSUMER_HEADER, "alice")
            .header(CALL_ID_HEADER, "abc")
            .body(Body::empty())
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));

        let ctx = call_context(&req);
        assert_eq!(ctx.consumer.as_deref(), Some("alice"));
        assert_eq!(ctx.method, "/svc/Foo");
        assert_eq!(ctx.peer, Some(peer));
        assert_eq!(ctx.call_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_inner_service() {
        let inner = service_fn(|req: Request<Body>| async move {
            let consumer = admission(&req)
                .map(|a| a.consumer.clone())
                .unwrap_or_default();
            Ok::<_, Infallible>(Response::new(Body::from(consumer)))
        });
        let svc = AuthLayer::new(gate()).layer(inner);
        let req = Request::builder()
            .uri("/svc/Foo")
            .header(CONSUMER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();

        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejected_request_never_reaches_inner_service() {
        let reached = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&reached);
        let inner = service_fn(move |_req: Request<Body>| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }
        });
        let svc = AuthLayer::new(gate()).layer(inner);

        let req = Request::builder()
            .uri("/other/Foo")
            .header(CONSUMER_HEADER, "alice")
            .body(Body::empty())
            .unwrap();
        let response = svc.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));

        let req = Request::builder().uri("/svc/Foo").body(Body::empty()).unwrap();
        let response = svc.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(!reached.load(std::sync::atomic::Ordering::SeqCst));
    }
}
