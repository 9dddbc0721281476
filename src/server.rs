//! Axum server setup, shared application state, and graceful shutdown.
//!
//! Contains [`AppState`] (the `Arc`-shared state holding config, compiled
//! metric label rules, the metrics registry, HTTP client, stats, and
//! uptime), [`build_router`] for constructing the Axum router with
//! middleware layers, [`build_http_client`] for the connection-pooled hyper
//! client, and [`shutdown_signal`] for SIGTERM / Ctrl+C handling.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::model::{Config, MetricsConfig};
use crate::config::ConfigVersion;
use crate::error::TelltaleError;
use crate::health::health_handler;
use crate::metrics::{DisabledRegistry, PrometheusRegistry, Registry, RetryMetrics};
use crate::middleware::host_filter::HostFilter;
use crate::middleware::metrics::track_requests;
use crate::middleware::path_template::PathTemplater;
use crate::proxy;

/// Host and path rules compiled from the `metrics` config section.
#[derive(Debug, Clone)]
pub struct MetricLabels {
    pub hosts: HostFilter,
    pub paths: PathTemplater,
}

impl MetricLabels {
    pub fn compile(metrics: &MetricsConfig) -> Result<Self, TelltaleError> {
        let hosts = HostFilter::new(&metrics.hosts).map_err(|source| {
            TelltaleError::InvalidPattern {
                field: "metrics.hosts",
                source,
            }
        })?;
        let paths = PathTemplater::new(&metrics.paths).map_err(|source| {
            TelltaleError::InvalidPattern {
                field: "metrics.paths.version",
                source,
            }
        })?;
        Ok(Self { hosts, paths })
    }
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Arc<Config>,
    pub labels: Arc<MetricLabels>,
    pub version: ConfigVersion,
    pub source_name: String,
    pub loaded_at: Instant,
}

impl LoadedConfig {
    pub fn new(
        config: Config,
        version: ConfigVersion,
        source_name: impl Into<String>,
    ) -> Result<Self, TelltaleError> {
        let labels = MetricLabels::compile(&config.metrics)?;
        Ok(Self {
            config: Arc::new(config),
            labels: Arc::new(labels),
            version,
            source_name: source_name.into(),
            loaded_at: Instant::now(),
        })
    }
}

#[derive(Debug)]
pub struct Stats {
    pub forwarded: AtomicU64,
    pub failed: AtomicU64,
    pub retries: AtomicU64,
    pub config_reloads: AtomicU64,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            config_reloads: AtomicU64::new(0),
        }
    }
}

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub struct AppState {
    pub config: RwLock<LoadedConfig>,
    pub metrics: Arc<dyn Registry>,
    pub retry_metrics: Arc<dyn RetryMetrics>,
    /// Where the exposition is served, `None` when metrics are off. Fixed
    /// at startup.
    pub metrics_path: Option<String>,
    pub http_client: HttpClient,
    pub start_time: Instant,
    pub namespace: String,
    pub stats: Arc<Stats>,
}

/// The metrics registry for the process lifetime, seen both as a full
/// [`Registry`] and as the [`RetryMetrics`] the retry listeners take.
pub struct MetricsBackend {
    pub registry: Arc<dyn Registry>,
    pub retries: Arc<dyn RetryMetrics>,
    /// Present for the Prometheus registry, whose histograms need upkeep.
    pub prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

/// Metrics switched off in the config get a registry that refuses every
/// instrument.
pub fn build_metrics(metrics: &MetricsConfig) -> Result<MetricsBackend, TelltaleError> {
    if metrics.enabled {
        let registry = Arc::new(PrometheusRegistry::new()?);
        Ok(MetricsBackend {
            prometheus: Some(registry.handle()),
            registry: Arc::clone(&registry) as Arc<dyn Registry>,
            retries: registry,
        })
    } else {
        let registry = Arc::new(DisabledRegistry);
        Ok(MetricsBackend {
            prometheus: None,
            registry: Arc::clone(&registry) as Arc<dyn Registry>,
            retries: registry,
        })
    }
}

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in, rustls cannot
    // auto-detect which one to use. Explicitly install `ring`.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// Build the router. Request metrics only wrap the proxy fallback, so
/// `/health` and the exposition endpoint are never counted.
pub fn build_router(state: Arc<AppState>, max_body: usize) -> Router {
    let proxy = Router::new()
        .fallback(proxy::forward_handler)
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            track_requests,
        ))
        .with_state(Arc::clone(&state));

    let mut router = Router::new().route("/health", get(health_handler));
    if let Some(path) = &state.metrics_path {
        router = router.route(path, get(metrics_handler));
    }

    router
        .fallback_service(proxy)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        .with_state(state)
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
