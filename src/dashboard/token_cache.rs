//! Per-site dashboard session tokens
//!
//! Tokens are fetched lazily by logging into the site's dashboard through the
//! tunnel. The map sits behind one lock that is only held for reads and
//! writes; refreshes run outside it, serialized per site so concurrent callers
//! for the same site share one login.

use crate::proxy::headers::{
    content_types::APPLICATION_JSON, sanitize_headers, BASIC_PREFIX, CONTENT_TYPE,
    X_TUNNEL_AUTHORIZATION,
};
use crate::proxy::transport::{send_with_timeout, TransportError, TunnelTransport};
use crate::proxy::types::*;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Session token for one site's dashboard
#[derive(Clone, PartialEq, Eq)]
pub struct SiteToken(String);

impl SiteToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl AsRef<str> for SiteToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SiteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SiteToken(<redacted>)")
    }
}

/// Cached token and its expiry
#[derive(Clone, Debug)]
pub struct SiteTokenEntry {
    pub site_id: SiteId,
    pub token: SiteToken,
    pub expires_at: DateTime<Utc>,
}

impl SiteTokenEntry {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// How to log into a site's dashboard
#[derive(Clone, Debug)]
pub struct LoginSettings {
    pub authenticate_url: TargetUrl,
    pub username: String,
    pub password: String,
}

impl LoginSettings {
    fn basic_credential(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("{BASIC_PREFIX}{}", STANDARD.encode(raw))
    }
}

/// Body returned by the dashboard's authenticate endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(alias = "Token")]
    token: String,
    #[serde(alias = "ExpiresOn")]
    expires_on: String,
}

#[derive(Error, Debug)]
enum LoginError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("authenticate returned status {0}")]
    Status(StatusCode),

    #[error("reading login response: {0}")]
    Body(String),

    #[error("decoding login response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unparseable expiresOn '{0}'")]
    Expiry(String),

    #[error("building login request: {0}")]
    Request(String),
}

/// Parse `expiresOn`, which the dashboard sends as RFC 1123 with a numeric zone
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Bounded, concurrency-safe store of dashboard tokens keyed by site
pub struct SiteTokenCache {
    transport: Arc<dyn TunnelTransport>,
    login: LoginSettings,
    request_timeout: Duration,
    soft_limit: usize,
    entries: Mutex<HashMap<SiteId, SiteTokenEntry>>,
    refresh_locks: Mutex<HashMap<SiteId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Holds a site's refresh lock; dropping it (also on cancellation) removes
/// the lock from the map once nobody else is waiting on it
struct RefreshLease<'a> {
    cache: &'a SiteTokenCache,
    site_id: &'a SiteId,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        self.cache.release_refresh_lock(self.site_id, &self.lock);
    }
}

impl SiteTokenCache {
    pub const DEFAULT_SOFT_LIMIT: usize = 1000;

    pub fn new(
        transport: Arc<dyn TunnelTransport>,
        login: LoginSettings,
        request_timeout: Duration,
        soft_limit: usize,
    ) -> Self {
        Self {
            transport,
            login,
            request_timeout,
            soft_limit,
            entries: Mutex::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return a valid token for `site_id`, logging in first if there is none
    /// or the cached one has expired.
    ///
    /// A failed login is reported as [`ProxyError::MissingServiceDomain`].
    pub async fn get_token(&self, tenant_id: &TenantId, site_id: &SiteId) -> ProxyResult<SiteToken> {
        if let Some(token) = self.cached(site_id) {
            return Ok(token);
        }

        let lease = self.refresh_lease(site_id);
        let _guard = lease.lock.lock().await;
        // Another caller may have refreshed while we waited.
        match self.cached(site_id) {
            Some(token) => Ok(token),
            None => self.refresh(tenant_id, site_id).await,
        }
    }

    /// Number of cached entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, site_id: &SiteId) -> bool {
        self.entries.lock().contains_key(site_id)
    }

    fn cached(&self, site_id: &SiteId) -> Option<SiteToken> {
        let now = Utc::now();
        self.entries
            .lock()
            .get(site_id)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.token.clone())
    }

    fn refresh_lease<'a>(&'a self, site_id: &'a SiteId) -> RefreshLease<'a> {
        let lock = self
            .refresh_locks
            .lock()
            .entry(site_id.clone())
            .or_default()
            .clone();
        RefreshLease {
            cache: self,
            site_id,
            lock,
        }
    }

    fn release_refresh_lock(&self, site_id: &SiteId, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.refresh_locks.lock();
        // The map holds one reference and we hold one; anything more is a waiter.
        let idle = locks
            .get(site_id)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(lock) <= 2);
        if idle {
            locks.remove(site_id);
        }
    }

    async fn refresh(&self, tenant_id: &TenantId, site_id: &SiteId) -> ProxyResult<SiteToken> {
        match self.login(tenant_id, site_id).await {
            Ok(entry) => {
                debug!(site_id = %site_id, expires_at = %entry.expires_at, "Refreshed dashboard token");
                let token = entry.token.clone();
                self.store(entry);
                Ok(token)
            }
            Err(e) => {
                error!(site_id = %site_id, tenant_id = %tenant_id, "Dashboard login failed: {e}");
                Err(ProxyError::MissingServiceDomain(format!(
                    "Fail to get dashboard token for service domain {site_id}"
                )))
            }
        }
    }

    /// Insert `entry`, purging expired entries once the soft limit is exceeded
    fn store(&self, entry: SiteTokenEntry) {
        let mut entries = self.entries.lock();
        entries.insert(entry.site_id.clone(), entry);

        if entries.len() > self.soft_limit {
            let now = Utc::now();
            let before = entries.len();
            entries.retain(|_, entry| entry.is_valid_at(now));
            debug!(
                pruned = before - entries.len(),
                remaining = entries.len(),
                "Pruned expired dashboard tokens"
            );
        }
    }

    async fn login(&self, tenant_id: &TenantId, site_id: &SiteId) -> Result<SiteTokenEntry, LoginError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(
            X_TUNNEL_AUTHORIZATION,
            HeaderValue::from_str(&self.login.basic_credential())
                .map_err(|e| LoginError::Request(e.to_string()))?,
        );

        let mut request = Request::new(Bytes::new());
        *request.method_mut() = Method::POST;
        *request.uri_mut() = self
            .login
            .authenticate_url
            .as_ref()
            .parse()
            .map_err(|e: http::uri::InvalidUri| LoginError::Request(e.to_string()))?;
        *request.headers_mut() = sanitize_headers(&headers);

        let response = send_with_timeout(
            self.transport.as_ref(),
            self.request_timeout,
            tenant_id,
            site_id,
            request,
            &self.login.authenticate_url,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoginError::Status(status));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| LoginError::Body(e.to_string()))?
            .to_bytes();

        let login: LoginResponse = serde_json::from_slice(&body)?;
        let expires_at =
            parse_expiry(&login.expires_on).ok_or_else(|| LoginError::Expiry(login.expires_on.clone()))?;

        Ok(SiteTokenEntry {
            site_id: site_id.clone(),
            token: SiteToken::new(login.token),
            expires_at,
        })
    }
}
