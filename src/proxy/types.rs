//! Type definitions for the proxy module

use nutype::nutype;
use std::time::Duration;
use thiserror::Error;

use crate::proxy::transport::TransportError;

// ========== Size and Capacity Types ==========

/// Maximum size for inbound request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0)
)]
pub struct RequestSizeLimit(usize);

/// Upper bound on dashboard sub-requests in flight for one combine call
#[nutype(
    derive(Clone, Copy, Debug, Display, PartialEq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |n: &usize| *n > 0)
)]
pub struct CombineConcurrency(usize);

// ========== Identity Types ==========

/// Identifier of a remote service domain (the "edge id" in request paths)
#[nutype(
    validate(not_empty, predicate = |s: &str| !s.contains('/')),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, AsRef)
)]
pub struct SiteId(String);

/// Tenant owning the caller's credential
#[nutype(
    validate(not_empty),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, AsRef)
)]
pub struct TenantId(String);

/// User behind the caller's credential
#[nutype(
    validate(not_empty),
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, AsRef)
)]
pub struct UserId(String);

/// Opaque bearer credential presented to the control plane
#[nutype(
    validate(not_empty),
    derive(Clone, Debug, Hash, PartialEq, Eq, Deserialize, Serialize, AsRef)
)]
pub struct BearerToken(String);

/// Path that bypasses authentication
#[nutype(
    derive(Clone, Debug, Display, Hash, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| s.starts_with('/'))
)]
pub struct BypassPath(String);

/// Absolute URL the remote agent should call
#[nutype(
    derive(Clone, Debug, Display, PartialEq, Eq, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://"))
)]
pub struct TargetUrl(String);

/// Proxy configuration
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Maximum inbound request body size in bytes
    pub max_request_size: RequestSizeLimit,
    /// Bound on every transport round trip
    pub request_timeout: Duration,
    /// Parallelism of combine sub-requests
    pub combine_concurrency: CombineConcurrency,
}

impl ProxyConfig {
    pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_COMBINE_CONCURRENCY: usize = 5;
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_request_size: RequestSizeLimit::try_new(Self::DEFAULT_MAX_REQUEST_SIZE)
                .expect("10MB is valid"),
            request_timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            combine_concurrency: CombineConcurrency::try_new(Self::DEFAULT_COMBINE_CONCURRENCY)
                .expect("5 is valid"),
        }
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Bad path: {path}, fullURL: {full_url}")]
    MalformedPath { path: String, full_url: String },

    #[error("Permission denied: tid|uid={tenant_id}|{user_id}")]
    PermissionDenied { tenant_id: TenantId, user_id: UserId },

    #[error("Missing or invalid bearer credential")]
    Unauthorized,

    #[error("{0}")]
    MissingServiceDomain(String),

    #[error("Unable to parse the combine path: {0}")]
    UnrecognizedCombinePath(String),

    #[error("Request too large: max {max_size} bytes")]
    RequestTooLarge { max_size: RequestSizeLimit },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Cannot encode combined response: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn malformed_path(path: impl Into<String>, full_url: impl Into<String>) -> Self {
        Self::MalformedPath {
            path: path.into(),
            full_url: full_url.into(),
        }
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
