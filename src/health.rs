//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload with the build version and
//! commit, uptime, config source metadata, whether metrics are exposed, and
//! cumulative request statistics including retries.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::ConfigVersion;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub commit: String,
    pub uptime_seconds: u64,
    pub config: ConfigHealth,
    pub metrics: MetricsHealth,
    pub stats: StatsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigHealth {
    pub source: String,
    pub version: String,
    pub loaded_ago_seconds: u64,
    pub namespace: String,
    pub routes: usize,
    pub targets: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsHealth {
    pub enabled: bool,
    pub path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub retries: u64,
    pub config_reloads: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (config, source_name, version, loaded_ago) = {
        let loaded = state.config.read().await;
        let ConfigVersion::Hash(hash) = &loaded.version;
        (
            Arc::clone(&loaded.config),
            loaded.source_name.clone(),
            hash.get(..8).unwrap_or(hash).to_string(),
            loaded.loaded_at.elapsed().as_secs(),
        )
    };

    let stats = &state.stats;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("TELLTALE_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config: ConfigHealth {
            source: source_name,
            version,
            loaded_ago_seconds: loaded_ago,
            namespace: state.namespace.clone(),
            routes: config.routes.len(),
            targets: config.total_targets(),
        },
        metrics: MetricsHealth {
            enabled: state.metrics_path.is_some(),
            path: state.metrics_path.clone(),
        },
        stats: StatsResponse {
            requests_forwarded: stats.forwarded.load(Ordering::Relaxed),
            requests_failed: stats.failed.load(Ordering::Relaxed),
            retries: stats.retries.load(Ordering::Relaxed),
            config_reloads: stats.config_reloads.load(Ordering::Relaxed),
        },
    })
}
