//! Tunnel proxy for requests addressed to remote service domains
//!
//! A request enters through the middleware stack (request id, logging,
//! authentication), is checked by the access gate, resolved to a site and
//! target URL, stripped of control-plane headers and handed to the
//! [`TunnelTransport`]. The site's response streams back unchanged.

pub mod access;
pub mod error_response;
pub mod headers;
pub mod middleware;
pub mod middleware_stack;
pub mod service;
pub mod transport;
pub mod tunnel;
pub mod types;
pub mod url_resolver;

#[cfg(test)]
pub mod test_utils;


pub use access::{AccessGate, Principal, Role};
pub use middleware::AuthConfig;
pub use service::ProxyService;
pub use transport::{RelayTransport, TransportError, TunnelTransport};
pub use types::{ProxyConfig, ProxyError, ProxyResult};
