//! Seam to the tunnel that carries requests to a site's on-prem agent
//!
//! Connection lifecycle, reconnection and framing belong to the tunnel
//! itself. This module only defines the call the proxy makes into it, plus
//! [`RelayTransport`], which hands requests to a relay process over HTTP.

use crate::proxy::headers::{X_RELAY_ERROR, X_TARGET_URL, X_TENANT_ID};
use crate::proxy::types::{SiteId, TargetUrl, TenantId};
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{header::HOST, HeaderValue, Request, Response, Uri};
use http_body_util::Full;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Request handed to the tunnel; the body is fully buffered
pub type TunnelRequest = Request<Bytes>;

/// Response coming back from the remote agent; the body may still be streaming
pub type TunnelResponse = Response<Body>;

/// Failures reported by the tunnel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid tunnel request: {0}")]
    InvalidRequest(String),

    #[error("Tunnel rejected the request: {0}")]
    Status(String),
}

/// Delivers an HTTP request to a site over an already-established channel
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    async fn send_http_request(
        &self,
        tenant_id: &TenantId,
        site_id: &SiteId,
        request: TunnelRequest,
        target_url: &TargetUrl,
    ) -> Result<TunnelResponse, TransportError>;
}

/// Run a transport call bounded by `timeout`.
///
/// Dropping the returned future (for example when the inbound connection
/// goes away) drops the transport call with it.
pub async fn send_with_timeout(
    transport: &dyn TunnelTransport,
    timeout: Duration,
    tenant_id: &TenantId,
    site_id: &SiteId,
    request: TunnelRequest,
    target_url: &TargetUrl,
) -> Result<TunnelResponse, TransportError> {
    tokio::time::timeout(
        timeout,
        transport.send_http_request(tenant_id, site_id, request, target_url),
    )
    .await
    .map_err(|_| TransportError::Timeout(timeout))?
}

/// Forwards tunnel requests to a relay endpoint that owns the site channels.
///
/// Each request goes to `{relay_url}/v1/sites/{site_id}/http` with the final
/// destination in `x-target-url` and the caller's tenant in `x-tenant-id`.
/// A response carrying `x-relay-error` came from the relay itself rather than
/// the site and is reported as [`TransportError::Status`].
#[derive(Clone)]
pub struct RelayTransport {
    relay_url: TargetUrl,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl RelayTransport {
    pub fn new(relay_url: TargetUrl) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .http1_title_case_headers(true)
            .http1_preserve_header_case(true)
            .build_http();

        Self { relay_url, client }
    }

    fn relay_uri(&self, site_id: &SiteId) -> Result<Uri, TransportError> {
        let uri = format!(
            "{}/v1/sites/{}/http",
            self.relay_url.as_ref().trim_end_matches('/'),
            urlencoding::encode(site_id.as_ref())
        );
        uri.parse()
            .map_err(|e| TransportError::InvalidRequest(format!("relay URI '{uri}': {e}")))
    }
}

#[async_trait]
impl TunnelTransport for RelayTransport {
    async fn send_http_request(
        &self,
        tenant_id: &TenantId,
        site_id: &SiteId,
        request: TunnelRequest,
        target_url: &TargetUrl,
    ) -> Result<TunnelResponse, TransportError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.relay_uri(site_id)?;
        parts.headers.remove(HOST);
        parts.headers.insert(
            X_TARGET_URL,
            HeaderValue::from_str(target_url.as_ref())
                .map_err(|e| TransportError::InvalidRequest(format!("target URL: {e}")))?,
        );
        parts.headers.insert(
            X_TENANT_ID,
            HeaderValue::from_str(tenant_id.as_ref())
                .map_err(|e| TransportError::InvalidRequest(format!("tenant id: {e}")))?,
        );

        debug!(site_id = %site_id, target_url = %target_url, uri = %parts.uri, "Relaying tunnel request");

        let response = self
            .client
            .request(Request::from_parts(parts, Full::new(body)))
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if let Some(reason) = response.headers().get(X_RELAY_ERROR) {
            let reason = reason.to_str().unwrap_or("unreadable reason");
            return Err(TransportError::Status(format!(
                "{} from relay: {reason}",
                response.status()
            )));
        }

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}
