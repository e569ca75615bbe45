//! Method names served by the gateway itself.
//!
//! Full method names take the `/<package>.<Service>/<Method>` form; the
//! transport exposes them as request paths.

/// Administrative audit stream
pub const SUBSCRIBE_AUDIT: &str = "/gateway.Admin/SubscribeAudit";

/// Administrative statistics stream
pub const SUBSCRIBE_STATISTICS: &str = "/gateway.Admin/SubscribeStatistics";

/// Sample business methods served by [`crate::rpc::EchoBusiness`]
pub const BIZ_CHECK: &str = "/gateway.Biz/Check";
pub const BIZ_ADD: &str = "/gateway.Biz/Add";
pub const BIZ_TEST: &str = "/gateway.Biz/Test";

/// Call group a method belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallGroup {
    /// Opaque application calls, fully delegated after authorization
    Business,
    /// Gateway-owned streaming calls
    Admin,
}

/// Classify a full method name.
pub fn call_group(method: &str) -> CallGroup {
    match method {
        SUBSCRIBE_AUDIT | SUBSCRIBE_STATISTICS => CallGroup::Admin,
        _ => CallGroup::Business,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_groups() {
        assert_eq!(call_group(SUBSCRIBE_AUDIT), CallGroup::Admin);
        assert_eq!(call_group(SUBSCRIBE_STATISTICS), CallGroup::Admin);
        assert_eq!(call_group(BIZ_CHECK), CallGroup::Business);
        assert_eq!(call_group("/other.Svc/Call"), CallGroup::Business);
    }
}
