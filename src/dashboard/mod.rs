//! Service-mesh dashboard integration
//!
//! Requests under `/v1.0/kiali` name their site with the `serviceDomain`
//! query parameter and are forwarded to the dashboard running on that site,
//! authenticated with a per-site session token. Overview requests fan out
//! into several dashboard calls combined into one JSON document.

pub mod combine;
pub mod origin;
pub mod token_cache;

use crate::proxy::access::{AccessGate, Principal};
use crate::proxy::headers::{
    content_types::APPLICATION_JSON, sanitize_headers, BEARER_PREFIX, CONTENT_TYPE,
    X_TUNNEL_AUTHORIZATION,
};
use crate::proxy::transport::{send_with_timeout, TunnelRequest, TunnelResponse, TunnelTransport};
use crate::proxy::types::*;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, Request};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub use token_cache::{LoginSettings, SiteToken, SiteTokenCache};

/// Where the dashboard lives on each site and how to log into it
#[derive(Clone, Debug)]
pub struct DashboardConfig {
    /// Base of the dashboard API as seen from the site
    pub api_base: TargetUrl,
    pub login: LoginSettings,
    /// Entry count past which expired tokens are purged
    pub token_cache_soft_limit: usize,
}

impl DashboardConfig {
    pub const DEFAULT_API_BASE: &'static str = "http://kiali.istio-system.svc:20001/kiali/api";
    pub const DEFAULT_AUTHENTICATE_URL: &'static str =
        "http://kiali.istio-system.svc:20001/kiali/api/authenticate";
}

/// Origin and combine proxy for the dashboard
#[derive(Clone)]
pub struct DashboardProxy {
    transport: Arc<dyn TunnelTransport>,
    config: Arc<ProxyConfig>,
    dashboard: Arc<DashboardConfig>,
    tokens: Arc<SiteTokenCache>,
}

impl DashboardProxy {
    pub fn new(
        transport: Arc<dyn TunnelTransport>,
        config: Arc<ProxyConfig>,
        dashboard: DashboardConfig,
    ) -> Self {
        let tokens = Arc::new(SiteTokenCache::new(
            transport.clone(),
            dashboard.login.clone(),
            config.request_timeout,
            dashboard.token_cache_soft_limit,
        ));

        Self {
            transport,
            config,
            dashboard: Arc::new(dashboard),
            tokens,
        }
    }

    pub fn token_cache(&self) -> &SiteTokenCache {
        &self.tokens
    }

    fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    /// Gate, fetch the site token and send one dashboard call
    async fn send_dashboard_request(
        &self,
        principal: &Principal,
        site_id: &SiteId,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> ProxyResult<TunnelResponse> {
        AccessGate::authorize(principal)?;

        let token = self.tokens.get_token(&principal.tenant_id, site_id).await?;
        let target = TargetUrl::try_new(url).map_err(|_| ProxyError::malformed_path(url, url))?;
        let request = dashboard_request(method, &target, &token, body)?;

        send_with_timeout(
            self.transport.as_ref(),
            self.request_timeout(),
            &principal.tenant_id,
            site_id,
            request,
            &target,
        )
        .await
        .map_err(|e| {
            warn!(site_id = %site_id, target_url = %target, "Dashboard call failed: {e}");
            e.into()
        })
    }
}

/// Build a request for the dashboard: JSON content type and the site token
/// smuggled past the control plane in the tunnel authorization header
fn dashboard_request(
    method: Method,
    target: &TargetUrl,
    token: &SiteToken,
    body: Bytes,
) -> ProxyResult<TunnelRequest> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(
        X_TUNNEL_AUTHORIZATION,
        HeaderValue::from_str(&format!("{BEARER_PREFIX}{}", token.as_ref()))
            .map_err(|e| ProxyError::Internal(format!("Invalid dashboard token: {e}")))?,
    );

    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = target
        .as_ref()
        .parse()
        .map_err(|_| ProxyError::malformed_path(target.as_ref(), target.as_ref()))?;
    *request.headers_mut() = sanitize_headers(&headers);

    Ok(request)
}

/// Extract the site from the `serviceDomain` query parameter
pub fn service_domain(query: Option<&str>) -> ProxyResult<SiteId> {
    const MISSING: &str = "Service domain must be specified via the serviceDomain query parameter";

    let value = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == origin::SERVICE_DOMAIN_PARAM)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProxyError::MissingServiceDomain(MISSING.to_string()))?;

    let decoded = urlencoding::decode(value)
        .map_err(|_| ProxyError::MissingServiceDomain(MISSING.to_string()))?;

    SiteId::try_new(decoded.into_owned()).map_err(|_| ProxyError::MissingServiceDomain(MISSING.to_string()))
}
