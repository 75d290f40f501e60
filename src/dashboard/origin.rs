//! Single-call dashboard proxy

use super::{service_domain, DashboardProxy};
use crate::proxy::access::{AccessGate, Principal};
use crate::proxy::headers::paths::DASHBOARD_PREFIX;
use crate::proxy::tunnel::{collect_request_body, passthrough};
use crate::proxy::types::*;
use axum::body::Body;
use http::{Request, Response};
use tracing::{debug, warn};

/// Query parameter naming the site; consumed here and never forwarded
pub const SERVICE_DOMAIN_PARAM: &str = "serviceDomain";

/// Map an inbound dashboard path and query onto the dashboard API.
///
/// The route prefix is dropped and trailing slashes trimmed; a bare `/graph`
/// is the namespaces graph. `serviceDomain` is removed from the query, every
/// other parameter is kept in its original order and encoding.
pub fn translate_path(api_base: &str, path: &str, query: Option<&str>) -> String {
    let sub = path.strip_prefix(DASHBOARD_PREFIX).unwrap_or(path);
    let sub = sub.trim_end_matches('/');

    let mut url = api_base.trim_end_matches('/').to_string();
    if sub == "/graph" {
        url.push_str("/namespaces");
    }
    url.push_str(sub);

    let forwarded = strip_service_domain(query);
    if !forwarded.is_empty() {
        url.push('?');
        url.push_str(&forwarded);
    }
    url
}

fn strip_service_domain(query: Option<&str>) -> String {
    query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(SERVICE_DOMAIN_PARAM))
        .collect::<Vec<_>>()
        .join("&")
}

impl DashboardProxy {
    /// Forward one dashboard call to the site named by `serviceDomain`
    pub async fn forward_origin(
        &self,
        principal: &Principal,
        request: Request<Body>,
    ) -> ProxyResult<Response<Body>> {
        AccessGate::authorize(principal)?;

        let site_id = service_domain(request.uri().query()).inspect_err(|e| {
            warn!("Dashboard proxy: {e}");
        })?;

        let url = translate_path(
            self.dashboard.api_base.as_ref(),
            request.uri().path(),
            request.uri().query(),
        );
        debug!(site_id = %site_id, target_url = %url, "Dashboard proxy: forwarding request");

        let (parts, body) = request.into_parts();
        let body = collect_request_body(body, self.config.max_request_size).await?;

        let response = self
            .send_dashboard_request(principal, &site_id, parts.method, &url, body)
            .await?;

        Ok(passthrough(response, &site_id))
    }
}
