//! Target resolution for tunnel proxy paths
//!
//! A proxy path has the shape `/{scheme}/{site id}/{rest}`. The decoded path
//! loses percent-encoded characters and the query string, so the suffix is
//! looked up again in the raw request URL and taken from there when found.

use crate::proxy::types::*;
use hyper::Uri;
use std::fmt;

/// Scheme the remote agent should use for the target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved destination of one proxied request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyTarget {
    pub scheme: Scheme,
    pub site_id: SiteId,
    pub url: TargetUrl,
}

impl ProxyTarget {
    /// Parse the target URL into a request URI
    pub fn uri(&self) -> ProxyResult<Uri> {
        self.url
            .as_ref()
            .parse()
            .map_err(|_| ProxyError::malformed_path(self.url.as_ref(), self.url.as_ref()))
    }
}

/// Resolves proxy paths into site and target URL
pub struct UrlResolver;

impl UrlResolver {
    /// Split `path` into scheme, site id and target URL.
    ///
    /// `full_url` is the raw request URL (path and query as received). If the
    /// decoded suffix occurs in it past position zero, everything from that
    /// point on is used, which carries the query string over verbatim.
    pub fn resolve(path: &str, full_url: &str) -> ProxyResult<ProxyTarget> {
        let malformed = || ProxyError::malformed_path(path, full_url);

        let (scheme, rest) = if let Some(rest) = path.strip_prefix("/https/") {
            (Scheme::Https, rest)
        } else if let Some(rest) = path.strip_prefix("/http/") {
            (Scheme::Http, rest)
        } else {
            return Err(malformed());
        };

        let (site, decoded_suffix) = rest.split_once('/').ok_or_else(malformed)?;
        let site_id = SiteId::try_new(site).map_err(|_| malformed())?;

        let suffix = match full_url.find(decoded_suffix) {
            Some(index) if index > 0 => full_url[index..].to_string(),
            _ => escape_uri_unsafe(decoded_suffix),
        };

        let url = TargetUrl::try_new(format!("{scheme}://{suffix}")).map_err(|_| malformed())?;

        Ok(ProxyTarget {
            scheme,
            site_id,
            url,
        })
    }
}

/// Percent-encode bytes a URI may not carry literally.
///
/// Decoding turns `%20` and friends back into raw bytes; this reverses that
/// for the bytes that matter while leaving `/`, `?` and `%` untouched.
fn escape_uri_unsafe(suffix: &str) -> String {
    let mut escaped = String::with_capacity(suffix.len());
    for byte in suffix.bytes() {
        match byte {
            b' ' | b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{' | b'|' | b'}' => {
                escaped.push_str(&format!("%{byte:02X}"))
            }
            0x00..=0x1F | 0x7F..=0xFF => escaped.push_str(&format!("%{byte:02X}")),
            _ => escaped.push(byte as char),
        }
    }
    escaped
}
