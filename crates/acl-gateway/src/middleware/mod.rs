//! Middleware for the gateway.
//!
//! Layer order: Request → Trace → Auth (gate) → Handler
//!
//! The gate consults the ACL and, for admitted calls, publishes the audit
//! event and records the call before the handler runs.

pub mod auth;
pub mod gate;
pub mod metrics;

pub use auth::{admission, call_context, AuthLayer, CALL_ID_HEADER, CONSUMER_HEADER};
pub use gate::{Admission, AuthorizationGate, CallContext};
pub use metrics::GatewayMetrics;
