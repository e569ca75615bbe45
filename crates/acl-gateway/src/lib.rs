// Allow missing docs for internal items
#![allow(missing_docs)]

//! ACL Gateway - RPC front door with per-consumer authorization, audit fan-out
//! and drained usage statistics.
//!
//! Every inbound call names a consumer and a full method. The gateway checks
//! the pair against an immutable ACL table before anything else happens; an
//! admitted call is published to every audit subscriber and counted by every
//! statistics subscriber, then handed to its handler.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ACL GATEWAY                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   POST /<svc>/<Method>          GET (WS) /gateway.Admin/Subscribe*│
//! │            │                                 │                   │
//! │  ┌─────────┴─────────────────────────────────┴─────────┐         │
//! │  │           Authorization Gate (AuthLayer)            │         │
//! │  │   consumer header + path → ACL match → admit/reject │         │
//! │  └───────┬──────────────────────┬──────────────────────┘         │
//! │          │ publish              │ record                          │
//! │  ┌───────┴────────┐     ┌───────┴─────────┐                       │
//! │  │AuditBroadcaster│     │ StatsAggregator │                       │
//! │  └───────┬────────┘     └───────┬─────────┘                       │
//! │          │ per-listener channel │ drained per interval            │
//! │          ▼                      ▼                                 │
//! │     audit streams         statistics streams   BusinessHandler    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use acl_gateway::start_gateway;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let acl = r#"{"biz_user": ["/gateway.Biz/*"], "admin": ["/gateway.Admin/*"]}"#;
//! let handle = start_gateway(shutdown_rx, "127.0.0.1:8082".parse()?, acl).await?;
//!
//! shutdown_tx.send(true)?;
//! handle.stopped().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod domain;
pub mod middleware;
pub mod rpc;
pub mod service;
pub mod stats;

// Re-exports for public API
pub use audit::AuditBroadcaster;
pub use domain::config::GatewayConfig;
pub use domain::error::{ApiError, ApiResult, GatewayError};
pub use domain::types::{AuditEvent, ListenerId, StatSnapshot};
pub use domain::{permitted, Acl};
pub use middleware::{AuthorizationGate, GatewayMetrics};
pub use rpc::{BusinessHandler, EchoBusiness};
pub use service::{start_gateway, GatewayHandle, GatewayServer, GatewayState};
pub use stats::StatsAggregator;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
