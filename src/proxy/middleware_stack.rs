//! Middleware stack builder for clean composition
//!
//! This module provides a builder pattern for composing the Tower middleware stack,
//! making it easier to maintain and test the middleware pipeline.

use crate::proxy::middleware::*;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Builder for composing the proxy middleware stack
pub struct ProxyMiddlewareStack {
    auth_config: Arc<AuthConfig>,
}

impl ProxyMiddlewareStack {
    pub fn new(auth_config: AuthConfig) -> Self {
        Self {
            auth_config: Arc::new(auth_config),
        }
    }

    /// Apply the complete middleware stack to a router
    ///
    /// The middleware are applied in the following order (outer to inner):
    /// 1. HTTP trace spans
    /// 2. Request ID generation/propagation
    /// 3. Logging (with request ID)
    /// 4. Error correlation
    /// 5. Authentication
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            // Innermost first
            .layer(from_fn_with_state(self.auth_config, auth_middleware))
            .layer(from_fn(error_handling_middleware))
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Create a stack with custom auth configuration
    pub fn with_auth(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = Arc::new(auth_config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::access::Principal;
    use crate::proxy::headers::{paths, X_REQUEST_ID};
    use crate::proxy::test_utils::test_helpers::*;
    use axum::{body::Body, http::StatusCode, Extension};
    use tower::ServiceExt;

    async fn whoami(Extension(principal): Extension<Principal>) -> String {
        principal.user_id.to_string()
    }

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    fn app(auth_config: AuthConfig) -> Router {
        let router = Router::new()
            .route("/test", axum::routing::get(whoami))
            .route(paths::HEALTH, axum::routing::get(ok));
        ProxyMiddlewareStack::new(auth_config).apply_to_router(router)
    }

    #[tokio::test]
    async fn test_middleware_stack_builder() {
        let response = app(test_auth_config())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/test")
                    .header("Authorization", format!("Bearer {OPERATOR_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_middleware_stack_health_bypass() {
        let response = app(AuthConfig::default())
            .oneshot(
                axum::http::Request::builder()
                    .uri(paths::HEALTH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthorized_response_has_request_id() {
        let response = app(AuthConfig::default())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_with_auth_replaces_config() {
        let router = Router::new().route("/test", axum::routing::get(whoami));
        let app = ProxyMiddlewareStack::new(AuthConfig::default())
            .with_auth(test_auth_config())
            .apply_to_router(router);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/test")
                    .header("Authorization", format!("Bearer {USER_TOKEN}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
