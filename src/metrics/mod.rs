//! Metric instruments and the registries that hand them out.
//!
//! Instruments follow a label-scoped view model: [`Counter::with`] and
//! [`Histogram::with`] take alternating label keys and values
//! (`["service", "users", "code", "200"]`) and return a view that records
//! under those labels. Registries are created once at startup and passed
//! to the middleware explicitly.
//!
//! [`PrometheusRegistry`] backs the instruments with the `metrics` facade;
//! [`DisabledRegistry`] refuses every instrument so callers exercise their
//! best-effort path.

mod prometheus;

use std::sync::Arc;

pub use prometheus::PrometheusRegistry;

pub const SERVICE_REQUESTS_TOTAL: &str = "telltale_service_requests_total";
pub const SERVICE_REQUEST_DURATION_SECONDS: &str = "telltale_service_request_duration_seconds";
pub const SERVICE_RETRIES_TOTAL: &str = "telltale_service_retries_total";

/// Value used for a trailing label key that has no value.
pub const UNKNOWN_LABEL_VALUE: &str = "unknown";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MetricsError {
    #[error("metrics are disabled")]
    Disabled,

    #[error("metrics recorder could not be installed: {0}")]
    Install(String),
}

/// A monotonically increasing instrument.
pub trait Counter: Send + Sync {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter>;
    fn add(&self, delta: f64);
}

/// An instrument recording a distribution of observations.
pub trait Histogram: Send + Sync {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram>;
    fn observe(&self, value: f64);
}

/// The one capability the retry listener needs from a metrics backend.
pub trait RetryMetrics: Send + Sync {
    fn service_retries_counter(&self) -> Result<Arc<dyn Counter>, MetricsError>;
}

/// Everything the proxy records per service.
pub trait Registry: RetryMetrics {
    fn service_requests_counter(&self) -> Result<Arc<dyn Counter>, MetricsError>;
    fn service_request_duration(&self) -> Result<Arc<dyn Histogram>, MetricsError>;

    /// Text exposition of the current values, when the backend has one.
    fn render(&self) -> Option<String> {
        None
    }
}

/// Registry used when metrics are switched off in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRegistry;

impl RetryMetrics for DisabledRegistry {
    fn service_retries_counter(&self) -> Result<Arc<dyn Counter>, MetricsError> {
        Err(MetricsError::Disabled)
    }
}

impl Registry for DisabledRegistry {
    fn service_requests_counter(&self) -> Result<Arc<dyn Counter>, MetricsError> {
        Err(MetricsError::Disabled)
    }

    fn service_request_duration(&self) -> Result<Arc<dyn Histogram>, MetricsError> {
        Err(MetricsError::Disabled)
    }
}

/// Pair up alternating label keys and values.
///
/// An odd-length input gets [`UNKNOWN_LABEL_VALUE`] for its last key.
#[must_use]
pub fn label_pairs(label_values: &[&str]) -> Vec<(String, String)> {
    label_values
        .chunks(2)
        .map(|pair| {
            let key = pair[0].to_string();
            let value = pair.get(1).copied().unwrap_or(UNKNOWN_LABEL_VALUE);
            (key, value.to_string())
        })
        .collect()
}
