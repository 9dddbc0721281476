//! Core HTTP request forwarding handler.
//!
//! The [`forward_handler`] function is the Axum fallback that receives
//! every request not served by the built-in endpoints, matches it against
//! configured routes, and forwards it to the route's targets. Submodules
//! handle route matching ([`routing`]), header construction ([`headers`]),
//! the retry loop ([`retry`]), the upstream call itself ([`upstream`]), and
//! the response writers handed to the recorder ([`writer`]).

pub mod headers;
pub mod retry;
pub mod routing;
pub mod upstream;
pub mod writer;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use self::headers::ForwardContext;
use self::retry::{RetryListeners, StatsRetryListener};
use self::upstream::{UpstreamCall, UpstreamError, UpstreamResponse};
use self::writer::{BufferedWriter, ClientWriter, DisconnectAwareWriter};
use crate::middleware::metrics::ServiceName;
use crate::middleware::recorder::{self, ResponseWriter};
use crate::middleware::retry_listener::MetricsRetryListener;
use crate::server::AppState;

#[allow(clippy::too_many_lines)]
pub async fn forward_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    req_headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let correlation_id = req_headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);

    // Clone the Arc<Config> to release the RwLock before any .await
    let config = Arc::clone(&state.config.read().await.config);

    let Some(matched) = routing::match_route(&config.routes, path, method.as_str()) else {
        tracing::warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            "no route matched"
        );
        return StatusCode::NOT_FOUND.into_response();
    };
    let route = matched.route;
    let service = route.service.clone();

    tracing::info!(
        correlation_id = %correlation_id,
        service = %service,
        method = %method,
        path = %path,
        targets = route.targets.len(),
        "request received"
    );

    let client_ip = addr.ip().to_string();
    let ctx = ForwardContext {
        original: &req_headers,
        client_ip: &client_ip,
        correlation_id: &correlation_id,
        route,
        defaults: &config.defaults,
    };

    // The guard lives until the handler returns; axum dropping this future
    // on disconnect drops the guard and signals the upstream task.
    let (writer, _disconnect_guard) = if config.defaults.cancel_on_disconnect {
        let (writer, guard) = DisconnectAwareWriter::new();
        (ClientWriter::DisconnectAware(writer), Some(guard))
    } else {
        (ClientWriter::Buffered(BufferedWriter::default()), None)
    };
    let mut response_writer = recorder::wrap(writer);

    let outcome = match UpstreamCall::prepare(
        &state.http_client,
        &ctx,
        &matched.params,
        method.clone(),
        body,
    ) {
        Ok(call) => {
            let mut listeners = RetryListeners::default();
            listeners.push(MetricsRetryListener::new(
                Arc::clone(&state.retry_metrics),
                service.as_str(),
            ));
            listeners.push(StatsRetryListener(Arc::clone(&state.stats)));

            let closed = response_writer
                .as_close_notifier()
                .map(|n| n.close_notify());
            let cid = correlation_id.clone();
            let task = tokio::spawn(async move {
                let work = call.run(&listeners);
                match closed {
                    Some(notify) => tokio::select! {
                        result = work => result,
                        () = recorder::closed(notify) => {
                            tracing::info!(correlation_id = %cid, "client disconnected, upstream call abandoned");
                            Err(UpstreamError::ClientGone)
                        }
                    },
                    None => work.await,
                }
            });

            task.await.unwrap_or_else(|join_err| Err(UpstreamError::Task(join_err)))
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(UpstreamResponse {
            status,
            headers: mut resp_headers,
            body,
        }) => {
            state.stats.forwarded.fetch_add(1, Ordering::Relaxed);
            headers::strip_response_hop_by_hop(&mut resp_headers);
            if let Ok(value) = HeaderValue::from_str(&correlation_id) {
                resp_headers.insert("x-correlation-id", value);
            }
            *response_writer.headers_mut() = resp_headers;
            response_writer.write_header(status);
            response_writer.write(&body);
        }
        Err(e) => {
            state.stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                correlation_id = %correlation_id,
                service = %service,
                error = %e,
                "upstream call failed"
            );
            response_writer.write_header(StatusCode::BAD_GATEWAY);
        }
    }

    tracing::info!(
        correlation_id = %correlation_id,
        service = %service,
        status = response_writer.status().as_u16(),
        "request completed"
    );

    let mut response = response_writer.into_inner().into_response();
    response.extensions_mut().insert(ServiceName(service));
    response
}
