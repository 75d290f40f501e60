//! Overview aggregation
//!
//! An overview path expands into a fixed set of dashboard calls. The calls
//! run concurrently and their results are merged into one JSON object keyed
//! by logical name. A call that fails is left out of the object.

use super::{service_domain, DashboardProxy};
use crate::proxy::access::{AccessGate, Principal};
use crate::proxy::headers::{content_types::APPLICATION_JSON, paths::DASHBOARD_PREFIX, CONTENT_TYPE};
use crate::proxy::tunnel::collect_request_body;
use crate::proxy::types::*;
use axum::body::Body;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use regex::Regex;
use serde::Serialize;
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

static OVERVIEW_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/namespaces/[^/]+(?:/(apps|services|workloads)/[^/]+)?/overview$")
        .expect("overview pattern is valid")
});

/// Which entity an overview describes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverviewKind {
    Namespace,
    App,
    Service,
    Workload,
}

/// Logical keys and the dashboard URL each one is fetched from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CombinedRequestPlan {
    pub kind: OverviewKind,
    pub requests: Vec<(&'static str, String)>,
}

impl CombinedRequestPlan {
    /// Classify `path` (with or without the route prefix) as an overview.
    pub fn parse(api_base: &str, path: &str) -> ProxyResult<Self> {
        let sub = path.strip_prefix(DASHBOARD_PREFIX).unwrap_or(path);
        let sub = sub.trim_end_matches('/');

        let captures = OVERVIEW_PATH
            .captures(sub)
            .ok_or_else(|| ProxyError::UnrecognizedCombinePath(path.to_string()))?;

        let kind = match captures.get(1).map(|m| m.as_str()) {
            None => OverviewKind::Namespace,
            Some("apps") => OverviewKind::App,
            Some("services") => OverviewKind::Service,
            Some(_) => OverviewKind::Workload,
        };

        let entity = sub.strip_suffix("/overview").unwrap_or(sub);
        let base = format!("{}{entity}", api_base.trim_end_matches('/'));

        let mut requests = match kind {
            OverviewKind::Namespace => vec![
                ("health", format!("{base}/health")),
                ("metrics", format!("{base}/metrics")),
                ("validations", format!("{base}/validations")),
            ],
            _ => vec![
                ("outbound", format!("{base}/dashboard")),
                ("inbound", format!("{base}/dashboard?direction=inbound")),
                ("health", format!("{base}/health")),
                ("detail", base.clone()),
            ],
        };
        match kind {
            OverviewKind::Service => requests.push(("graph", format!("{base}/graph?graphType=service"))),
            OverviewKind::Workload => requests.push(("graph", format!("{base}/graph?graphType=workload"))),
            _ => {}
        }

        Ok(Self { kind, requests })
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.requests.iter().map(|(key, _)| *key)
    }
}

/// Status and body of one finished dashboard call
#[derive(Clone, Debug)]
pub struct SubResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CombinedEntry<'a> {
    status_code: u16,
    result: Option<&'a RawValue>,
}

/// Encode results as `{"key": {"statusCode": .., "result": ..}}`.
///
/// Bodies are embedded verbatim; an empty body becomes `null`. A body that is
/// not JSON fails the whole encoding.
pub fn encode_combined(results: &BTreeMap<&'static str, SubResponse>) -> ProxyResult<Vec<u8>> {
    let entries = results
        .iter()
        .map(|(key, sub)| {
            let result = if sub.body.is_empty() {
                None
            } else {
                Some(serde_json::from_slice::<&RawValue>(&sub.body)?)
            };
            Ok((
                *key,
                CombinedEntry {
                    status_code: sub.status.as_u16(),
                    result,
                },
            ))
        })
        .collect::<Result<BTreeMap<_, _>, serde_json::Error>>()?;

    Ok(serde_json::to_vec(&entries)?)
}

impl DashboardProxy {
    /// Expand an overview request, run its calls and merge the results
    pub async fn forward_combined(
        &self,
        principal: &Principal,
        request: Request<Body>,
    ) -> ProxyResult<Response<Body>> {
        AccessGate::authorize(principal)?;

        let site_id = service_domain(request.uri().query()).inspect_err(|e| {
            warn!("Dashboard combine: {e}");
        })?;
        let plan = CombinedRequestPlan::parse(self.dashboard.api_base.as_ref(), request.uri().path())
            .inspect_err(|e| warn!("Dashboard combine: {e}"))?;

        // Log in once up front so the sub-requests find a cached token.
        self.tokens.get_token(&principal.tenant_id, &site_id).await?;

        let (parts, body) = request.into_parts();
        let body = collect_request_body(body, self.config.max_request_size).await?;
        let method = parts.method;

        debug!(site_id = %site_id, kind = ?plan.kind, keys = plan.requests.len(), "Dashboard combine: dispatching");

        let calls: Vec<_> = plan
            .requests
            .into_iter()
            .map(|(key, url)| {
                let (site_id, method, body) = (&site_id, method.clone(), body.clone());
                async move {
                    let result = self.sub_request(principal, site_id, method, &url, body).await;
                    (key, url, result)
                }
            })
            .collect();

        let finished: Vec<_> = stream::iter(calls)
            .buffer_unordered(*self.config.combine_concurrency.as_ref())
            .collect()
            .await;

        let mut results = BTreeMap::new();
        for (key, url, result) in finished {
            match result {
                Ok(sub) => {
                    results.insert(key, sub);
                }
                Err(e) => warn!(key, target_url = %url, "Dashboard combine: dropping key: {e}"),
            }
        }

        let encoded = encode_combined(&results).inspect_err(|e| {
            warn!(site_id = %site_id, "Dashboard combine: encoding failed: {e}");
        })?;

        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .body(Body::from(encoded))?)
    }

    async fn sub_request(
        &self,
        principal: &Principal,
        site_id: &SiteId,
        method: Method,
        url: &str,
        body: Bytes,
    ) -> ProxyResult<SubResponse> {
        let response = self
            .send_dashboard_request(principal, site_id, method, url, body)
            .await?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProxyError::Internal(format!("Reading dashboard response: {e}")))?
            .to_bytes();

        Ok(SubResponse { status, body })
    }
}
