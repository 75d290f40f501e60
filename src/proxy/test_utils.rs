//! Test utilities for proxy module testing
//!
//! Provides a recording [`TunnelTransport`] double so tests can assert what
//! crossed the tunnel boundary and how often, plus principal and auth helpers.

#[cfg(test)]
pub mod test_helpers {
    use crate::dashboard::{DashboardConfig, LoginSettings, SiteTokenCache};
    use crate::proxy::access::{Principal, Role};
    use crate::proxy::middleware::AuthConfig;
    use crate::proxy::transport::{
        TransportError, TunnelRequest, TunnelResponse, TunnelTransport,
    };
    use crate::proxy::types::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use bytes::Bytes;
    use http::{HeaderMap, Method, Response, Uri};
    use parking_lot::Mutex;
    use std::time::Duration;

    pub const OPERATOR_TOKEN: &str = "operator-token";
    pub const INFRA_ADMIN_TOKEN: &str = "infra-admin-token";
    pub const USER_TOKEN: &str = "user-token";

    /// Successful dashboard login handing out `kiali-token`
    pub const LOGIN_OK: &str =
        r#"{"token":"kiali-token","expiresOn":"Fri, 01 Jan 2100 00:00:00 +0000"}"#;

    /// One call observed by [`RecordingTransport`]
    #[derive(Clone, Debug)]
    pub struct RecordedCall {
        pub tenant_id: TenantId,
        pub site_id: SiteId,
        pub method: Method,
        pub uri: Uri,
        pub headers: HeaderMap,
        pub body: Bytes,
        pub target_url: TargetUrl,
    }

    type Responder = dyn Fn(&RecordedCall) -> Result<TunnelResponse, TransportError> + Send + Sync;

    /// Transport double that records every call and answers via a closure
    pub struct RecordingTransport {
        calls: Mutex<Vec<RecordedCall>>,
        responder: Box<Responder>,
        delay: Option<Duration>,
    }

    impl RecordingTransport {
        pub fn new(
            responder: impl Fn(&RecordedCall) -> Result<TunnelResponse, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responder: Box::new(responder),
                delay: None,
            }
        }

        /// Always answer with `status` and `body`
        pub fn ok(status: u16, body: &'static str) -> Self {
            Self::new(move |_| Ok(json_response(status, body)))
        }

        /// Always fail as if the site were unreachable
        pub fn failing() -> Self {
            Self::new(|_| Err(TransportError::Connection("site unreachable".to_string())))
        }

        /// Sleep before answering each call
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl TunnelTransport for RecordingTransport {
        async fn send_http_request(
            &self,
            tenant_id: &TenantId,
            site_id: &SiteId,
            request: TunnelRequest,
            target_url: &TargetUrl,
        ) -> Result<TunnelResponse, TransportError> {
            let (parts, body) = request.into_parts();
            let call = RecordedCall {
                tenant_id: tenant_id.clone(),
                site_id: site_id.clone(),
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                target_url: target_url.clone(),
            };
            self.calls.lock().push(call.clone());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            (self.responder)(&call)
        }
    }

    /// Build a JSON transport response
    pub fn json_response(status: u16, body: impl Into<String>) -> TunnelResponse {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Body::from(body.into()))
            .expect("test response should be valid")
    }

    pub fn principal(roles: &[Role]) -> Principal {
        Principal::new(
            TenantId::try_new("tenant-1").expect("valid tenant"),
            UserId::try_new("user-1").expect("valid user"),
            roles.iter().copied(),
        )
    }

    pub fn operator() -> Principal {
        principal(&[Role::Operator])
    }

    pub fn plain_user() -> Principal {
        principal(&[Role::User])
    }

    /// Auth configuration knowing an operator, an infra admin and a plain user
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig::default()
            .with_principal(
                BearerToken::try_new(OPERATOR_TOKEN).expect("valid token"),
                operator(),
            )
            .with_principal(
                BearerToken::try_new(INFRA_ADMIN_TOKEN).expect("valid token"),
                principal(&[Role::InfraAdmin]),
            )
            .with_principal(
                BearerToken::try_new(USER_TOKEN).expect("valid token"),
                plain_user(),
            )
    }

    pub fn test_proxy_config() -> ProxyConfig {
        ProxyConfig {
            request_timeout: Duration::from_secs(5),
            ..ProxyConfig::default()
        }
    }

    pub fn test_dashboard_config() -> DashboardConfig {
        DashboardConfig {
            api_base: TargetUrl::try_new(DashboardConfig::DEFAULT_API_BASE).expect("valid base"),
            login: LoginSettings {
                authenticate_url: TargetUrl::try_new(DashboardConfig::DEFAULT_AUTHENTICATE_URL)
                    .expect("valid url"),
                username: "sherlock".to_string(),
                password: "$h3rl0ck!".to_string(),
            },
            token_cache_soft_limit: SiteTokenCache::DEFAULT_SOFT_LIMIT,
        }
    }
}
