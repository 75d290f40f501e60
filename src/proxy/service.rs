//! Main proxy service implementation
//!
//! The `ProxyService` owns the generic tunnel proxy and the dashboard proxy
//! and exposes both behind one Axum router.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use edge_tunnel::proxy::{AuthConfig, ProxyConfig, ProxyService, RelayTransport};
//!
//! // 1. Create service with a transport and configuration
//! let transport = Arc::new(RelayTransport::new(relay_url));
//! let service = ProxyService::new(transport, ProxyConfig::default(), dashboard_config);
//!
//! // 2. Convert to Axum router
//! let router = service.into_router(AuthConfig::default());
//!
//! // 3. Serve with Axum
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```
//!
//! ## Routes
//!
//! - `GET /health`: liveness, no authentication
//! - `GET|POST|PUT|DELETE /v1.0/proxy/{scheme}/{site id}/{rest}`: tunnel proxy
//! - `/v1.0/kiali[/...]?serviceDomain={site id}`: dashboard origin proxy, or
//!   the combine proxy for `GET .../overview`

use crate::dashboard::{DashboardConfig, DashboardProxy};
use crate::proxy::access::Principal;
use crate::proxy::headers::paths::{DASHBOARD_PREFIX, HEALTH, PROXY_PREFIX};
use crate::proxy::middleware::AuthConfig;
use crate::proxy::middleware_stack::ProxyMiddlewareStack;
use crate::proxy::transport::TunnelTransport;
use crate::proxy::tunnel::TunnelProxy;
use crate::proxy::types::*;
use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Extension, Router,
};
use std::sync::Arc;

/// Suffix marking a dashboard path as a combined overview
const OVERVIEW_SUFFIX: &str = "/overview";

/// Main proxy service combining the tunnel and dashboard proxies
#[derive(Clone)]
pub struct ProxyService {
    tunnel: TunnelProxy,
    dashboard: DashboardProxy,
}

impl ProxyService {
    pub fn new(
        transport: Arc<dyn TunnelTransport>,
        config: ProxyConfig,
        dashboard_config: DashboardConfig,
    ) -> Self {
        let config = Arc::new(config);

        Self {
            tunnel: TunnelProxy::new(transport.clone(), config.clone()),
            dashboard: DashboardProxy::new(transport, config, dashboard_config),
        }
    }

    pub fn dashboard(&self) -> &DashboardProxy {
        &self.dashboard
    }

    /// Create an Axum router for the proxy service with middleware
    pub fn into_router(self, auth_config: AuthConfig) -> Router {
        let proxy_route = format!("{PROXY_PREFIX}/{{*path}}");
        let dashboard_slash = format!("{DASHBOARD_PREFIX}/");
        let dashboard_nested = format!("{DASHBOARD_PREFIX}/{{*rest}}");

        let router = Router::new()
            .route(HEALTH, get(health_handler))
            .route(
                &proxy_route,
                get(proxy_handler)
                    .post(proxy_handler)
                    .put(proxy_handler)
                    .delete(proxy_handler),
            )
            .route(DASHBOARD_PREFIX, dashboard_methods())
            .route(&dashboard_slash, dashboard_methods())
            .route(&dashboard_nested, dashboard_methods())
            .with_state(Arc::new(self));

        ProxyMiddlewareStack::new(auth_config).apply_to_router(router)
    }
}

fn dashboard_methods() -> MethodRouter<Arc<ProxyService>> {
    get(dashboard_handler)
        .post(dashboard_handler)
        .put(dashboard_handler)
        .patch(dashboard_handler)
        .delete(dashboard_handler)
}

/// Generic tunnel proxy handler
async fn proxy_handler(
    State(service): State<Arc<ProxyService>>,
    Extension(principal): Extension<Principal>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let proxy_path = format!("/{path}");
    service.tunnel.forward(&principal, &proxy_path, request).await
}

/// Dashboard handler; overview paths go to the combine proxy
async fn dashboard_handler(
    State(service): State<Arc<ProxyService>>,
    Extension(principal): Extension<Principal>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let is_overview = request
        .uri()
        .path()
        .trim_end_matches('/')
        .ends_with(OVERVIEW_SUFFIX);

    if !is_overview {
        return service.dashboard.forward_origin(&principal, request).await;
    }

    if request.method() != Method::GET {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    service.dashboard.forward_combined(&principal, request).await
}

/// Health check handler
async fn health_handler() -> &'static str {
    "OK"
}
