//! Business call group.
//!
//! The gateway only decides whether a business call may run; what it does is
//! up to the [`BusinessHandler`] plugged into the server.

use crate::domain::methods::{BIZ_ADD, BIZ_CHECK, BIZ_TEST};
use crate::domain::{ApiError, ApiResult};
use crate::middleware::Admission;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

/// Handler for admitted unary business calls.
///
/// Results and errors are returned to the caller unchanged.
#[async_trait]
pub trait BusinessHandler: Send + Sync {
    async fn call(&self, admission: &Admission, params: Value) -> ApiResult<Value>;
}

/// Serves the sample business methods by echoing their parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBusiness;

impl EchoBusiness {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BusinessHandler for EchoBusiness {
    #[instrument(skip(self, params), fields(consumer = %admission.consumer, call_id = %admission.call_id))]
    async fn call(&self, admission: &Admission, params: Value) -> ApiResult<Value> {
        match admission.method.as_str() {
            BIZ_CHECK | BIZ_ADD | BIZ_TEST => {
                info!(method = %admission.method, "Business call");
                Ok(params)
            }
            other => Err(ApiError::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::codes;
    use crate::domain::CorrelationId;
    use serde_json::json;

    fn admission(method: &str) -> Admission {
        Admission {
            consumer: "biz_user".into(),
            method: method.into(),
            call_id: CorrelationId::new(),
        }
    }

    #[tokio::test]
    async fn test_sample_methods_echo_params() {
        let biz = EchoBusiness::new();
        for method in [BIZ_CHECK, BIZ_ADD, BIZ_TEST] {
            let params = json!({"n": 1, "method": method});
            let result = biz.call(&admission(method), params.clone()).await.unwrap();
            assert_eq!(result, params);
        }
        assert_eq!(
            biz.call(&admission(BIZ_CHECK), Value::Null).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_unknown_method_not_found() {
        let err = EchoBusiness::new()
            .call(&admission("/gateway.Biz/Delete"), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert!(err.message.contains("/gateway.Biz/Delete"));
    }
}
