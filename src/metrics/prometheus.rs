//! Prometheus-backed registry built on the `metrics` facade types.
//!
//! The recorder is owned by the registry rather than installed as the
//! process-global recorder, so each registry (and each test) records into
//! its own storage.

use std::sync::Arc;

use metrics::{Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use super::{
    label_pairs, Counter, Histogram, MetricsError, Registry, RetryMetrics,
    SERVICE_REQUESTS_TOTAL, SERVICE_REQUEST_DURATION_SECONDS, SERVICE_RETRIES_TOTAL,
};

const DURATION_BUCKETS: &[f64] = &[0.1, 0.3, 1.2, 5.0];

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

pub struct PrometheusRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl PrometheusRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(SERVICE_REQUEST_DURATION_SECONDS.to_string()),
                DURATION_BUCKETS,
            )
            .map_err(|e| MetricsError::Install(e.to_string()))?
            .build_recorder();
        let handle = recorder.handle();
        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
        })
    }

    #[must_use]
    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    fn counter(&self, name: &'static str) -> Arc<dyn Counter> {
        Arc::new(PrometheusCounter {
            recorder: Arc::clone(&self.recorder),
            name,
            labels: Vec::new(),
        })
    }
}

impl RetryMetrics for PrometheusRegistry {
    fn service_retries_counter(&self) -> Result<Arc<dyn Counter>, MetricsError> {
        Ok(self.counter(SERVICE_RETRIES_TOTAL))
    }
}

impl Registry for PrometheusRegistry {
    fn service_requests_counter(&self) -> Result<Arc<dyn Counter>, MetricsError> {
        Ok(self.counter(SERVICE_REQUESTS_TOTAL))
    }

    fn service_request_duration(&self) -> Result<Arc<dyn Histogram>, MetricsError> {
        Ok(Arc::new(PrometheusHistogram {
            recorder: Arc::clone(&self.recorder),
            name: SERVICE_REQUEST_DURATION_SECONDS,
            labels: Vec::new(),
        }))
    }

    fn render(&self) -> Option<String> {
        Some(self.handle.render())
    }
}

fn key(name: &'static str, labels: &[(String, String)]) -> Key {
    let labels: Vec<Label> = labels
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.clone()))
        .collect();
    Key::from_parts(name, labels)
}

fn extend(labels: &[(String, String)], label_values: &[&str]) -> Vec<(String, String)> {
    let mut merged = labels.to_vec();
    merged.extend(label_pairs(label_values));
    merged
}

struct PrometheusCounter {
    recorder: Arc<PrometheusRecorder>,
    name: &'static str,
    labels: Vec<(String, String)>,
}

impl Counter for PrometheusCounter {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter> {
        Arc::new(Self {
            recorder: Arc::clone(&self.recorder),
            name: self.name,
            labels: extend(&self.labels, label_values),
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn add(&self, delta: f64) {
        // Counters in this recorder are integral; fractional deltas are
        // rejected rather than truncated.
        if !delta.is_finite() || delta < 0.0 || delta.fract() != 0.0 {
            tracing::debug!(metric = self.name, delta, "ignoring invalid counter delta");
            return;
        }
        self.recorder
            .register_counter(&key(self.name, &self.labels), &METADATA)
            .increment(delta as u64);
    }
}

struct PrometheusHistogram {
    recorder: Arc<PrometheusRecorder>,
    name: &'static str,
    labels: Vec<(String, String)>,
}

impl Histogram for PrometheusHistogram {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram> {
        Arc::new(Self {
            recorder: Arc::clone(&self.recorder),
            name: self.name,
            labels: extend(&self.labels, label_values),
        })
    }

    fn observe(&self, value: f64) {
        self.recorder
            .register_histogram(&key(self.name, &self.labels), &METADATA)
            .record(value);
    }
}
