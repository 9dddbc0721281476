//! A single logical upstream call, retried across a route's targets.
//!
//! [`UpstreamCall::prepare`] resolves every target once (parameter
//! substitution, URL parsing, forwarded headers, timeout). [`UpstreamCall::run`]
//! then drives the retry loop, picking target `attempt % targets` for each
//! try, so a refused connection on one target moves on to the next.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};

use super::headers::ForwardContext;
use super::retry::{self, RetryListener, Retryable};
use crate::config::model::DEFAULT_TIMEOUT_MS;
use crate::server::HttpClient;

pub type UpstreamRequest = hyper::Request<Full<Bytes>>;

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("no usable target for route {route}")]
    NoTargets { route: String },

    #[error("failed to build request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("request to {target} timed out after {}ms", .timeout.as_millis())]
    Timeout { target: String, timeout: Duration },

    #[error("reading body from {target} failed: {source}")]
    Body {
        target: String,
        #[source]
        source: hyper::Error,
    },

    #[error("client disconnected")]
    ClientGone,

    #[error("upstream task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Only failures to connect are retried; the target never saw the request.
impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect { .. })
    }
}

#[derive(Debug, Clone)]
struct PreparedTarget {
    url: String,
    headers: HeaderMap,
    timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
struct AttemptTimeout(Duration);

pub struct UpstreamCall {
    client: HttpClient,
    method: Method,
    body: Bytes,
    targets: Vec<PreparedTarget>,
    retries: u32,
}

impl UpstreamCall {
    /// Resolve the route's targets. Targets whose URL does not parse after
    /// substitution are logged and left out.
    pub fn prepare(
        client: &HttpClient,
        ctx: &ForwardContext<'_>,
        params: &HashMap<String, String>,
        method: Method,
        body: Bytes,
    ) -> Result<Self, UpstreamError> {
        let route = ctx.route;
        let targets: Vec<PreparedTarget> = route
            .targets
            .iter()
            .filter_map(|target| {
                let resolved = substitute_params(&target.url, params);
                let parsed = match url::Url::parse(&resolved) {
                    Ok(u) => u,
                    Err(e) => {
                        tracing::error!(target = %resolved, error = %e, "invalid target URL");
                        return None;
                    }
                };
                let timeout_ms = target
                    .timeout
                    .or(route.timeout)
                    .unwrap_or(ctx.defaults.timeout);
                Some(PreparedTarget {
                    headers: ctx.headers_for(&parsed),
                    url: resolved,
                    timeout: Duration::from_millis(timeout_ms),
                })
            })
            .collect();

        if targets.is_empty() {
            return Err(UpstreamError::NoTargets {
                route: route.path.clone(),
            });
        }

        Ok(Self {
            client: client.clone(),
            method,
            body,
            targets,
            retries: route.retry.attempts,
        })
    }

    pub async fn run(&self, listener: &dyn RetryListener) -> Result<UpstreamResponse, UpstreamError> {
        retry::execute(
            self.retries,
            listener,
            |attempt| self.request_for(attempt),
            |req| self.send(req),
        )
        .await
    }

    fn request_for(&self, attempt: u32) -> Result<UpstreamRequest, UpstreamError> {
        let target = &self.targets[attempt as usize % self.targets.len()];

        let mut builder = hyper::Request::builder()
            .method(self.method.clone())
            .uri(&target.url);
        for (key, value) in &target.headers {
            builder = builder.header(key, value);
        }

        let mut req = builder.body(Full::new(self.body.clone()))?;
        req.extensions_mut().insert(AttemptTimeout(target.timeout));
        Ok(req)
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn send(&self, req: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let target = req.uri().to_string();
        let timeout = req
            .extensions()
            .get::<AttemptTimeout>()
            .map_or(Duration::from_millis(DEFAULT_TIMEOUT_MS), |t| t.0);
        let start = Instant::now();

        let response = match tokio::time::timeout(timeout, self.client.request(req)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) if source.is_connect() => {
                return Err(UpstreamError::Connect { target, source });
            }
            Ok(Err(source)) => return Err(UpstreamError::Request { target, source }),
            Err(_) => return Err(UpstreamError::Timeout { target, timeout }),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(source) => return Err(UpstreamError::Body { target, source }),
        };

        tracing::info!(
            target = %target,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "target responded"
        );

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Substitute `:param` placeholders in URL templates.
/// Longer keys go first so `:userId` is not clobbered by `:user`.
fn substitute_params(url_template: &str, params: &HashMap<String, String>) -> String {
    let mut entries: Vec<(&String, &String)> = params.iter().collect();
    entries.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

    entries
        .into_iter()
        .fold(url_template.to_string(), |url, (key, value)| {
            url.replace(&format!(":{key}"), value)
        })
}
