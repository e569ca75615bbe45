//! Audit event fan-out.

pub mod broadcaster;

pub use broadcaster::{AuditBroadcaster, AuditReceiver};
