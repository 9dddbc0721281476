//! Per-service request count and duration.
//!
//! [`track_requests`] wraps the proxy fallback. It records nothing for
//! requests whose host the [`HostFilter`](super::host_filter::HostFilter)
//! does not keep, nor for requests that never reached a backend (the proxy
//! tags routed responses with a [`ServiceName`] extension).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use super::host_filter::request_host;
use crate::metrics::Registry;
use crate::server::AppState;

/// Set on a response by the proxy to name the service that handled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceName(pub String);

/// The label values a single request contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLabels {
    pub method: String,
    pub protocol: &'static str,
    pub host: String,
    pub path: String,
}

pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(host) = request_host(request.uri(), request.headers()) else {
        return next.run(request).await;
    };

    // Clone the compiled rules out so the lock is not held across the request
    let labels = Arc::clone(&state.config.read().await.labels);
    if !labels.hosts.keep(&host) {
        return next.run(request).await;
    }

    let request_labels = RequestLabels {
        method: request.method().as_str().to_owned(),
        protocol: protocol(request.headers()),
        host,
        path: labels.paths.template_for_uri(request.uri()),
    };

    let start = Instant::now();
    let response = next.run(request).await;

    if let Some(ServiceName(service)) = response.extensions().get::<ServiceName>() {
        record(
            state.metrics.as_ref(),
            service,
            response.status().as_u16(),
            &request_labels,
            start.elapsed(),
        );
    }

    response
}

/// Add one request and its duration to the service instruments. Failures
/// to obtain an instrument are logged and dropped.
pub fn record(
    registry: &dyn Registry,
    service: &str,
    code: u16,
    labels: &RequestLabels,
    elapsed: Duration,
) {
    let code = code.to_string();
    let values = [
        "service",
        service,
        "code",
        code.as_str(),
        "method",
        labels.method.as_str(),
        "protocol",
        labels.protocol,
        "host",
        labels.host.as_str(),
        "path",
        labels.path.as_str(),
    ];

    match registry.service_requests_counter() {
        Ok(counter) => counter.with(&values).add(1.0),
        Err(e) => tracing::debug!(service, error = %e, "request count not recorded"),
    }
    match registry.service_request_duration() {
        Ok(histogram) => histogram.with(&values).observe(elapsed.as_secs_f64()),
        Err(e) => tracing::debug!(service, error = %e, "request duration not recorded"),
    }
}

/// `websocket` for upgrade requests, `sse` for event streams, `http` otherwise.
#[must_use]
pub fn protocol(headers: &HeaderMap) -> &'static str {
    let has_token = |name: header::HeaderName, token: &str| {
        headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case(token))
    };

    if has_token(header::CONNECTION, "upgrade") && has_token(header::UPGRADE, "websocket") {
        "websocket"
    } else if has_token(header::ACCEPT, "text/event-stream") {
        "sse"
    } else {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;
    use crate::metrics::PrometheusRegistry;

    fn labels() -> RequestLabels {
        RequestLabels {
            method: "GET".into(),
            protocol: "http",
            host: "api.bar".into(),
            path: "/v1.2/service/foo".into(),
        }
    }

    #[test]
    fn plain_request_is_http() {
        assert_eq!(protocol(&HeaderMap::new()), "http");
    }

    #[test]
    fn websocket_upgrade_is_detected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert_eq!(protocol(&headers), "websocket");
    }

    #[test]
    fn upgrade_header_alone_is_not_websocket() {
        let mut headers = HeaderMap::new();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert_eq!(protocol(&headers), "http");
    }

    #[test]
    fn event_stream_is_sse() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        assert_eq!(protocol(&headers), "sse");
    }

    #[test]
    fn record_uses_label_outputs_verbatim() {
        let registry = PrometheusRegistry::new().unwrap();
        record(&registry, "users", 502, &labels(), Duration::from_millis(20));

        let text = registry.render().unwrap();
        let line = text
            .lines()
            .find(|l| l.starts_with("telltale_service_requests_total{"))
            .unwrap();
        assert!(line.contains("service=\"users\""));
        assert!(line.contains("code=\"502\""));
        assert!(line.contains("method=\"GET\""));
        assert!(line.contains("protocol=\"http\""));
        assert!(line.contains("host=\"api.bar\""));
        assert!(line.contains("path=\"/v1.2/service/foo\""));
        assert!(line.ends_with(" 1"));
        assert!(text.contains("telltale_service_request_duration_seconds_count{"));
    }

    #[test]
    fn record_with_disabled_registry_is_silent() {
        record(
            &crate::metrics::DisabledRegistry,
            "users",
            200,
            &labels(),
            Duration::ZERO,
        );
    }
}
