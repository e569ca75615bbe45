//! Gateway error types.
//!
//! [`ApiError`] is what a caller sees on the wire; [`GatewayError`] covers
//! startup, lifecycle and stream delivery failures inside the process.

use crate::domain::acl::AclError;
use crate::domain::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried by [`ApiError`]
pub mod codes {
    // JSON-RPC 2.0 standard errors (-32700 to -32600)
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Server errors (-32000 to -32099)
    pub const SERVER_ERROR: i32 = -32000;
    pub const UNAUTHENTICATED: i32 = -32016;
}

/// Caller-visible error with a numeric code
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code (see [`codes`])
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    pub data: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Rejection returned by the authorization gate.
    ///
    /// Missing identity and ACL denial produce the same value.
    pub fn unauthenticated() -> Self {
        Self::new(codes::UNAUTHENTICATED, "Unauthenticated")
    }

    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::new(
            codes::PARSE_ERROR,
            format!("Parse error: {}", details.into()),
        )
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_REQUEST,
            format!("Invalid request: {}", details.into()),
        )
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::new(
            codes::INVALID_PARAMS,
            format!("Invalid params: {}", details.into()),
        )
    }

    pub fn is_unauthenticated(&self) -> bool {
        self.code == codes::UNAUTHENTICATED
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let len = if self.data.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("ApiError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref data) = self.data {
            state.serialize_field("data", data)?;
        }
        state.end()
    }
}

impl<'de> Deserialize<'de> for ApiError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ErrorHelper {
            code: i32,
            message: String,
            data: Option<serde_json::Value>,
        }

        let helper = ErrorHelper::deserialize(deserializer)?;
        Ok(ApiError {
            code: helper.code,
            message: helper.message,
            data: helper.data,
        })
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_syntax() || e.is_eof() {
            ApiError::parse_error(e.to_string())
        } else {
            ApiError::invalid_params(e.to_string())
        }
    }
}

/// Result type for caller-facing operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Gateway-level errors (not sent to callers)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// ACL table could not be loaded
    #[error("ACL error: {0}")]
    Acl(#[from] AclError),

    /// Server socket bind error
    #[error("server bind error on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A streaming caller could not be reached
    #[error("stream delivery failed: {0}")]
    Delivery(String),

    /// Serving task ended abnormally
    #[error("server error: {0}")]
    Serve(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_is_uniform() {
        let a = ApiError::unauthenticated();
        let b = ApiError::unauthenticated();
        assert_eq!(a, b);
        assert!(a.is_unauthenticated());
        assert_eq!(a.code, codes::UNAUTHENTICATED);
    }

    #[test]
    fn test_error_codes() {
        let err = ApiError::method_not_found("/gateway.Biz/Nope");
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert!(err.message.contains("/gateway.Biz/Nope"));
        assert!(!err.is_unauthenticated());
    }

    #[test]
    fn test_error_serialization() {
        let err = ApiError::invalid_params("interval_seconds must be positive");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], -32602);
        assert!(json.get("data").is_none());

        let with_data = ApiError::with_data(codes::SERVER_ERROR, "boom", serde_json::json!({"k": 1}));
        let back: ApiError =
            serde_json::from_str(&serde_json::to_string(&with_data).unwrap()).unwrap();
        assert_eq!(back, with_data);
    }

    #[test]
    fn test_from_serde_error() {
        let json_err: Result<serde_json::Value, _> = serde_json::from_str("{invalid");
        let api_err: ApiError = json_err.unwrap_err().into();
        assert_eq!(api_err.code, codes::PARSE_ERROR);
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::from(AclError::Malformed("expected object".into()));
        assert!(err.to_string().contains("expected object"));
    }
}
