//! Domain types for the gateway.
//!
//! ACL table and matcher, audit/statistics records, configuration and errors.

pub mod acl;
pub mod config;
pub mod correlation;
pub mod error;
pub mod methods;
pub mod types;

pub use acl::{permitted, Acl, AclError, WILDCARD};
pub use config::{ConfigError, GatewayConfig, ShutdownConfig, StatsConfig};
pub use correlation::CorrelationId;
pub use error::{ApiError, ApiResult, GatewayError};
pub use methods::{call_group, CallGroup};
pub use types::{AuditEvent, ListenerId, StatSnapshot};
