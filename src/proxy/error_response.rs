//! Unified error response handling for the proxy service
//!
//! Every failure produced before a remote response exists is rendered as
//! `{"code", "message", "request_id"}` with the status from
//! [`ErrorResponseExt::status_code`].

use crate::proxy::headers::X_REQUEST_ID;
use crate::proxy::transport::TransportError;
use crate::proxy::types::ProxyError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Unique error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request ID for correlation
    pub request_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Convert to HTTP response with proper headers.
    ///
    /// Without a request ID the error travels along as a response extension
    /// so the middleware that knows the ID can re-render it.
    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let Some(request_id) = self.request_id.clone() else {
            let mut response = (status, Json(self.clone())).into_response();
            response.extensions_mut().insert(self);
            return response;
        };

        let mut response = (status, Json(self)).into_response();
        if let Ok(header_value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID, header_value);
        }
        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    /// Convert to standardized error response
    fn to_error_response(&self) -> ErrorResponse;

    /// Get the appropriate HTTP status code
    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        let code = match self {
            MalformedPath { .. } => "BAD_PATH",
            PermissionDenied { .. } => "PERMISSION_DENIED",
            Unauthorized => "UNAUTHORIZED",
            MissingServiceDomain(_) => "SERVICE_DOMAIN_NOT_FOUND",
            UnrecognizedCombinePath(_) => "UNRECOGNIZED_COMBINE_PATH",
            RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            Transport(TransportError::Timeout(_)) => "GATEWAY_TIMEOUT",
            Transport(_) => "TUNNEL_ERROR",
            Encoding(_) => "ENCODING_ERROR",
            Http(_) => "HTTP_ERROR",
            Internal(_) => "INTERNAL_ERROR",
        };

        ErrorResponse::new(code, self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            MalformedPath { .. } | MissingServiceDomain(_) | UnrecognizedCombinePath(_) => {
                StatusCode::BAD_REQUEST
            }
            Unauthorized => StatusCode::UNAUTHORIZED,
            PermissionDenied { .. } => StatusCode::FORBIDDEN,
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Transport(_) => StatusCode::BAD_GATEWAY,
            Encoding(_) | Http(_) | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.to_error_response().into_response_with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::types::{RequestSizeLimit, TenantId, UserId};
    use rstest::rstest;
    use std::time::Duration;

    #[rstest]
    #[case::bad_path(ProxyError::malformed_path("/x", "/v1.0/proxy/x"), StatusCode::BAD_REQUEST)]
    #[case::no_domain(ProxyError::MissingServiceDomain("serviceDomain not found".into()), StatusCode::BAD_REQUEST)]
    #[case::combine(ProxyError::UnrecognizedCombinePath("/a".into()), StatusCode::BAD_REQUEST)]
    #[case::unauthorized(ProxyError::Unauthorized, StatusCode::UNAUTHORIZED)]
    #[case::denied(
        ProxyError::PermissionDenied {
            tenant_id: TenantId::try_new("t").unwrap(),
            user_id: UserId::try_new("u").unwrap(),
        },
        StatusCode::FORBIDDEN
    )]
    #[case::too_large(
        ProxyError::RequestTooLarge { max_size: RequestSizeLimit::try_new(1).unwrap() },
        StatusCode::PAYLOAD_TOO_LARGE
    )]
    #[case::timeout(
        ProxyError::Transport(TransportError::Timeout(Duration::from_secs(1))),
        StatusCode::GATEWAY_TIMEOUT
    )]
    #[case::tunnel(
        ProxyError::Transport(TransportError::Connection("down".into())),
        StatusCode::BAD_GATEWAY
    )]
    #[case::relay(
        ProxyError::Transport(TransportError::Status("503 from relay".into())),
        StatusCode::BAD_GATEWAY
    )]
    #[case::internal(ProxyError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_mapping(#[case] error: ProxyError, #[case] expected: StatusCode) {
        assert_eq!(error.status_code(), expected);
    }

    #[test]
    fn test_error_body_carries_message() {
        let error = ProxyError::malformed_path("/http/x", "/v1.0/proxy/http/x");
        let body = error.to_error_response();

        assert_eq!(body.code, "BAD_PATH");
        assert_eq!(body.message, "Bad path: /http/x, fullURL: /v1.0/proxy/http/x");
        assert!(body.request_id.is_none());
    }

    #[test]
    fn test_encoding_failure_is_server_error() {
        let error: ProxyError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_error_response().code, "ENCODING_ERROR");
    }

    #[test]
    fn test_response_without_request_id_keeps_error_for_middleware() {
        let response = ProxyError::Unauthorized.into_response();

        let pending = response.extensions().get::<ErrorResponse>().unwrap();
        assert_eq!(pending.code, "UNAUTHORIZED");
        assert!(pending.request_id.is_none());
    }

    #[test]
    fn test_response_with_request_id_header() {
        let response = ErrorResponse::new("X", "y")
            .with_request_id("req-123")
            .into_response_with_status(StatusCode::BAD_GATEWAY);

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-123");
    }
}
