//! Generic tunnel proxy
//!
//! Takes `/v1.0/proxy/{scheme}/{site id}/{rest}` requests, checks the caller,
//! resolves the remote target, strips control-plane headers and hands the
//! request to the transport. The remote response goes back unchanged.

use crate::proxy::access::{AccessGate, Principal};
use crate::proxy::headers::{content_types::APPLICATION_JSON, sanitize_headers, CONTENT_TYPE};
use crate::proxy::transport::{send_with_timeout, TunnelResponse, TunnelTransport};
use crate::proxy::types::*;
use crate::proxy::url_resolver::UrlResolver;
use axum::body::Body;
use bytes::Bytes;
use http::{header::HOST, HeaderValue, Request, Response};
use http_body_util::BodyExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Proxy for arbitrary paths on a remote site
#[derive(Clone)]
pub struct TunnelProxy {
    transport: Arc<dyn TunnelTransport>,
    config: Arc<ProxyConfig>,
}

impl TunnelProxy {
    pub fn new(transport: Arc<dyn TunnelTransport>, config: Arc<ProxyConfig>) -> Self {
        Self { transport, config }
    }

    /// Forward `request` to the site named in `proxy_path`.
    ///
    /// `proxy_path` is the decoded `/{scheme}/{site}/{rest}` part of the route.
    pub async fn forward(
        &self,
        principal: &Principal,
        proxy_path: &str,
        request: Request<Body>,
    ) -> ProxyResult<Response<Body>> {
        AccessGate::authorize(principal)?;

        let full_url = request.uri().to_string();
        let target = UrlResolver::resolve(proxy_path, &full_url).inspect_err(|e| {
            warn!("Tunnel proxy: {e}");
        })?;
        let uri = target.uri()?;

        let (parts, body) = request.into_parts();
        let body = collect_request_body(body, self.config.max_request_size).await?;

        let mut headers = sanitize_headers(&parts.headers);
        headers.remove(HOST);

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        debug!(
            site_id = %target.site_id,
            tenant_id = %principal.tenant_id,
            target_url = %target.url,
            method = %outbound.method(),
            "Tunnel proxy: forwarding request"
        );

        let response = send_with_timeout(
            self.transport.as_ref(),
            self.config.request_timeout,
            &principal.tenant_id,
            &target.site_id,
            outbound,
            &target.url,
        )
        .await
        .inspect_err(|e| {
            warn!(
                site_id = %target.site_id,
                target_url = %target.url,
                "Tunnel proxy: send error: {e}"
            );
        })?;

        debug!(status = response.status().as_u16(), "Tunnel proxy: response");
        Ok(passthrough(response, &target.site_id))
    }
}

/// Buffer an inbound body, enforcing the configured size limit
pub(crate) async fn collect_request_body(body: Body, limit: RequestSizeLimit) -> ProxyResult<Bytes> {
    http_body_util::Limited::new(body, *limit.as_ref())
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| {
            if e.is::<http_body_util::LengthLimitError>() {
                ProxyError::RequestTooLarge { max_size: limit }
            } else {
                ProxyError::Internal(format!("Body collection error: {e}"))
            }
        })
}

/// Turn a remote response into the outbound response.
///
/// Status and headers are copied as-is and the body streams through. If the
/// body fails midway the client sees a truncated response; status and headers
/// already went out and are not taken back.
pub(crate) fn passthrough(response: TunnelResponse, site_id: &SiteId) -> Response<Body> {
    let (mut parts, body) = response.into_parts();

    if !parts.headers.contains_key(CONTENT_TYPE) {
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    let site_id = site_id.clone();
    let body = body.map_err(move |e| {
        warn!(site_id = %site_id, "Tunnel proxy: response body error: {e}");
        e
    });

    Response::from_parts(parts, Body::new(body))
}
