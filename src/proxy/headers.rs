//! HTTP header constants and the sanitizer applied at the tunnel boundary
//!
//! Requests leaving the control plane must not carry its own credential, and
//! callers need a way to pass headers that the control plane's middleware
//! would otherwise interpret. Both concerns are handled by [`sanitize_headers`].

use ::http::header::{self, HeaderMap, HeaderName};

/// Prefix that smuggles a header through the control plane untouched.
///
/// `X-Ntnx-Xks-Foo: bar` reaches the remote site as `Foo: bar`. Header names
/// are case-insensitive and `http` stores them lowercased, so matching is
/// done against the lowercase form.
pub const TUNNEL_HEADER_PREFIX: &str = "x-ntnx-xks-";

/// Tunnel-prefixed authorization header, used to hand a credential to the
/// remote side without it being taken for a control-plane credential.
pub const X_TUNNEL_AUTHORIZATION: HeaderName = HeaderName::from_static("x-ntnx-xks-authorization");

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Headers carrying routing metadata to the relay
pub const X_TARGET_URL: &str = "x-target-url";
pub const X_TENANT_ID: &str = "x-tenant-id";
/// Set by the relay when it could not hand the request to the site
pub const X_RELAY_ERROR: &str = "x-relay-error";

/// Authorization header prefixes
pub const BEARER_PREFIX: &str = "Bearer ";
pub const BASIC_PREFIX: &str = "Basic ";

/// Standard header re-exports for convenience
pub use header::{AUTHORIZATION, CONTENT_TYPE};

/// Well-known paths
pub mod paths {
    /// Health check endpoint path
    pub const HEALTH: &str = "/health";

    /// Generic tunnel proxy prefix
    pub const PROXY_PREFIX: &str = "/v1.0/proxy";

    /// Dashboard proxy prefix
    pub const DASHBOARD_PREFIX: &str = "/v1.0/kiali";
}

/// Common content types
pub mod content_types {
    pub const APPLICATION_JSON: &str = "application/json";
}

/// Build the header set forwarded to a remote site.
///
/// The control-plane `Authorization` header is dropped, tunnel-prefixed
/// headers are renamed to their unprefixed form, and everything else is
/// copied. All values of a name are kept in order. When a prefixed header
/// and a plain header map to the same name, the prefixed one wins.
pub fn sanitize_headers(headers: &HeaderMap) -> HeaderMap {
    let mut sanitized = HeaderMap::with_capacity(headers.keys_len());

    for name in headers.keys() {
        if *name == AUTHORIZATION || name.as_str().starts_with(TUNNEL_HEADER_PREFIX) {
            continue;
        }
        for value in headers.get_all(name) {
            sanitized.append(name.clone(), value.clone());
        }
    }

    for name in headers.keys() {
        let Some(stripped) = name.as_str().strip_prefix(TUNNEL_HEADER_PREFIX) else {
            continue;
        };
        let Ok(unprefixed) = HeaderName::from_bytes(stripped.as_bytes()) else {
            continue;
        };
        sanitized.remove(&unprefixed);
        for value in headers.get_all(name) {
            sanitized.append(unprefixed.clone(), value.clone());
        }
    }

    sanitized
}
