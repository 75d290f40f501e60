//! Middleware implementations for the proxy service

use crate::proxy::access::Principal;
use crate::proxy::error_response::ErrorResponse;
use crate::proxy::headers::{paths, AUTHORIZATION, BEARER_PREFIX, X_REQUEST_ID};
use crate::proxy::types::*;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Configuration for authentication middleware
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Known bearer credentials and the caller each one identifies
    pub principals: HashMap<BearerToken, Principal>,
    /// Paths that bypass authentication
    pub bypass_paths: HashSet<BypassPath>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        let bypass_paths = BypassPath::try_new(paths::HEALTH.to_string())
            .into_iter()
            .collect();

        Self {
            principals: HashMap::new(),
            bypass_paths,
        }
    }
}

impl AuthConfig {
    pub fn with_principal(mut self, token: BearerToken, principal: Principal) -> Self {
        self.principals.insert(token, principal);
        self
    }

    fn is_bypassed(&self, path: &str) -> bool {
        BypassPath::try_new(path.to_string())
            .map(|p| self.bypass_paths.contains(&p))
            .unwrap_or(false)
    }

    fn principal_for(&self, authorization: Option<&str>) -> Option<&Principal> {
        let token = authorization?.strip_prefix(BEARER_PREFIX)?.trim();
        let token = BearerToken::try_new(token.to_string()).ok()?;
        self.principals.get(&token)
    }
}

/// Request ID middleware - ensures every request has a unique ID for tracing
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::now_v7);

    // Hyphenated UUIDs are plain ASCII
    let header_value = HeaderValue::from_str(&request_id.to_string()).ok();

    if let Some(value) = &header_value {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
    }

    let mut response = next.run(request).await;

    if let Some(value) = header_value {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    response
}

/// Authentication middleware - maps the bearer credential to a [`Principal`]
/// and attaches it to the request
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    if auth_config.is_bypassed(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(principal) = auth_config.principal_for(authorization).cloned() else {
        warn!(path = %request.uri().path(), "Missing or unknown bearer credential");
        return Err(ProxyError::Unauthorized);
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Logging middleware - logs request/response details with timing
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request_id_of(&request);

    info!(request_id, method = %method, path, "Incoming request");

    let response = next.run(request).await;

    info!(
        request_id,
        method = %method,
        path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Stamps the request ID on error responses and logs server-side failures
pub async fn error_handling_middleware(request: Request, next: Next) -> Response {
    let request_id = request_id_of(&request);

    let mut response = next.run(request).await;
    let status = response.status();

    if let Some(error) = response.extensions_mut().remove::<ErrorResponse>() {
        response = error
            .with_request_id(request_id.clone())
            .into_response_with_status(status);
    }

    if status.is_server_error() {
        error!(request_id, status = status.as_u16(), "Request failed");
    }

    if !status.is_success() {
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
    }

    response
}

fn request_id_of(request: &Request) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::access::Role;
    use crate::proxy::test_utils::test_helpers::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::{from_fn, from_fn_with_state};
    use axum::response::IntoResponse;
    use tower::ServiceExt;

    /// Echoes the attached principal's user id, or 200 with no body
    async fn echo_principal(request: Request) -> Result<Response, std::convert::Infallible> {
        let user = request
            .extensions()
            .get::<Principal>()
            .map(|p| p.user_id.to_string())
            .unwrap_or_default();
        Ok(Response::new(Body::from(user)))
    }

    async fn call_authed(request: Request) -> Response {
        tower::ServiceBuilder::new()
            .layer(from_fn_with_state(Arc::new(test_auth_config()), auth_middleware))
            .service(tower::service_fn(echo_principal))
            .oneshot(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_id_generation() {
        let handler = tower::service_fn(|req: Request| async move {
            let id = req.headers().get(X_REQUEST_ID).cloned();
            let mut response = Response::new(Body::empty());
            if let Some(id) = id {
                response.headers_mut().insert("x-seen-id", id);
            }
            Ok::<_, std::convert::Infallible>(response)
        });
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .service(handler);

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        let response = service.oneshot(request).await.unwrap();

        let id = response.headers()[X_REQUEST_ID].to_str().unwrap();
        assert_eq!(id, response.headers()["x-seen-id"].to_str().unwrap());
        assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_request_id_propagated_when_valid() {
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(request_id_middleware))
            .service(tower::service_fn(echo_principal));

        let existing = Uuid::now_v7().to_string();
        let request = Request::builder()
            .uri("/test")
            .header(X_REQUEST_ID, &existing)
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.headers()[X_REQUEST_ID], existing.as_str());
    }

    #[tokio::test]
    async fn test_auth_attaches_principal() {
        let request = Request::builder()
            .uri("/v1.0/proxy/http/edge-1/svc")
            .header(AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
            .body(Body::empty())
            .unwrap();

        let response = call_authed(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"user-1");
    }

    #[tokio::test]
    async fn test_auth_rejects_unknown_token() {
        let request = Request::builder()
            .uri("/v1.0/proxy/http/edge-1/svc")
            .header(AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();

        let response = call_authed(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_rejects_missing_or_non_bearer_header() {
        let request = Request::builder()
            .uri("/v1.0/kiali/namespaces")
            .body(Body::empty())
            .unwrap();
        let response = call_authed(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/v1.0/kiali/namespaces")
            .header(AUTHORIZATION, format!("Basic {OPERATOR_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let response = call_authed(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_bypass_health_check() {
        let request = Request::builder()
            .uri(paths::HEALTH)
            .body(Body::empty())
            .unwrap();

        let response = call_authed(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_principal_lookup_trims_token() {
        let config = test_auth_config();
        let principal = config
            .principal_for(Some(&format!("Bearer  {USER_TOKEN} ")))
            .unwrap();
        assert!(principal.has_role(Role::User));
        assert!(config.principal_for(None).is_none());
        assert!(config.principal_for(Some("Bearer ")).is_none());
    }

    #[tokio::test]
    async fn test_error_responses_carry_request_id() {
        let handler = tower::service_fn(|_req: Request| async move {
            Ok::<_, std::convert::Infallible>(ProxyError::Unauthorized.into_response())
        });
        let service = tower::ServiceBuilder::new()
            .layer(from_fn(error_handling_middleware))
            .service(handler);

        let request = Request::builder()
            .uri("/x")
            .header(X_REQUEST_ID, "req-123")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-123");
    }
}
