//! `telltale run`: start the proxy server.
//!
//! Loads the config file, builds the metrics registry, starts the Axum
//! HTTP server with graceful shutdown, and spawns background tasks for
//! config hot-reloading and Prometheus histogram upkeep.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;

use crate::cli::RunArgs;
use crate::config::sources::FileSource;
use crate::config::ConfigSource;
use crate::error::TelltaleError;
use crate::logging;
use crate::server::{self, AppState, LoadedConfig, Stats};

const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn execute(args: RunArgs) -> Result<(), TelltaleError> {
    logging::init(
        &args.log_level,
        logging::resolve_format(args.pretty, args.json),
    );

    let source = resolve_config_source(&args).await?;
    let (mut config, version) = source.load().await?;

    // The CLI (or REQUEST_TIMEOUT_MS) owns the default target timeout
    config.defaults.timeout = args.timeout;

    let backend = server::build_metrics(&config.metrics)?;
    let metrics_path = config
        .metrics
        .enabled
        .then(|| config.metrics.path.clone());
    let route_count = config.routes.len();
    let target_count = config.total_targets();
    let loaded = LoadedConfig::new(config, version, source.name())?;

    let state = Arc::new(AppState {
        config: tokio::sync::RwLock::new(loaded),
        metrics: backend.registry,
        retry_metrics: backend.retries,
        metrics_path,
        http_client: server::build_http_client(),
        start_time: Instant::now(),
        namespace: args.namespace.clone(),
        stats: Arc::new(Stats::new()),
    });

    // Dropping shutdown_tx stops the background loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_handle = tokio::spawn(config_refresh_loop(
        Arc::clone(&state),
        source,
        args.timeout,
        args.poll_interval,
        shutdown_rx.clone(),
    ));
    let upkeep_handle = backend
        .prometheus
        .map(|handle| tokio::spawn(upkeep_loop(handle, shutdown_rx)));

    let router = server::build_router(Arc::clone(&state), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        routes = route_count,
        targets = target_count,
        namespace = %args.namespace,
        metrics_path = state.metrics_path.as_deref().unwrap_or("disabled"),
        "telltale started"
    );

    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    if let Err(e) = refresh_handle.await {
        tracing::error!(error = %e, "config refresh task failed");
    }
    if let Some(handle) = upkeep_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "metrics upkeep task failed");
        }
    }

    tracing::info!("telltale stopped");
    Ok(())
}

async fn resolve_config_source(args: &RunArgs) -> Result<FileSource, TelltaleError> {
    if let Some(path) = &args.config {
        return FileSource::open(path.clone());
    }

    FileSource::detect(std::path::Path::new(".")).await?.ok_or_else(|| {
        TelltaleError::NoConfigSource {
            hint: "Provide --config <file> or create ./telltale.yaml.".into(),
        }
    })
}

/// Drain histogram buffers so `/metrics` renders do not grow unbounded.
async fn upkeep_loop(handle: PrometheusHandle, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => handle.run_upkeep(),
            _ = shutdown.changed() => return,
        }
    }
}

async fn config_refresh_loop(
    state: Arc<AppState>,
    source: FileSource,
    timeout_override: u64,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("config refresh loop shutting down");
                return;
            }
        }

        let current_version = state.config.read().await.version.clone();

        match source.has_changed(&current_version).await {
            Ok(true) => reload(&state, &source, timeout_override).await,
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "config change check failed"),
        }
    }
}

async fn reload(state: &AppState, source: &FileSource, timeout_override: u64) {
    tracing::info!("config change detected, reloading");

    let loaded = source.load().await.and_then(|(mut config, version)| {
        config.defaults.timeout = timeout_override;
        LoadedConfig::new(config, version, source.name())
    });
    let loaded = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!(error = %e, "config reload failed, keeping current config");
            return;
        }
    };

    let metrics = &loaded.config.metrics;
    let wanted = metrics.enabled.then_some(metrics.path.as_str());
    if wanted != state.metrics_path.as_deref() {
        tracing::warn!(
            path = %metrics.path,
            enabled = metrics.enabled,
            "metrics endpoint changes take effect on restart"
        );
    }

    let route_count = loaded.config.routes.len();
    *state.config.write().await = loaded;
    state.stats.config_reloads.fetch_add(1, Ordering::Relaxed);
    tracing::info!(routes = route_count, "config reloaded");
}
