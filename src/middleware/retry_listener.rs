//! Retry counting per service.
//!
//! One [`MetricsRetryListener`] is created per proxied request and handed
//! to the retry loop, which calls it before every re-issue. Each call adds
//! exactly one to `service_retries_total{service=<name>}`.

use std::sync::Arc;

use crate::metrics::RetryMetrics;
use crate::proxy::retry::RetryListener;
use crate::proxy::upstream::UpstreamRequest;

pub struct MetricsRetryListener {
    metrics: Arc<dyn RetryMetrics>,
    service: String,
}

impl MetricsRetryListener {
    #[must_use]
    pub fn new(metrics: Arc<dyn RetryMetrics>, service: impl Into<String>) -> Self {
        Self {
            metrics,
            service: service.into(),
        }
    }
}

impl RetryListener for MetricsRetryListener {
    fn retried(&self, req: &UpstreamRequest, attempt: u32) {
        tracing::debug!(
            service = %self.service,
            attempt,
            uri = %req.uri(),
            "retrying upstream request"
        );

        match self.metrics.service_retries_counter() {
            Ok(counter) => counter.with(&["service", &self.service]).add(1.0),
            Err(e) => {
                tracing::debug!(service = %self.service, error = %e, "retry not recorded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http_body_util::Full;

    use super::*;
    use crate::metrics::{Counter, DisabledRegistry, MetricsError};

    #[derive(Default)]
    struct CollectingState {
        value: f64,
        last_labels: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct CollectingCounter {
        state: Arc<Mutex<CollectingState>>,
    }

    impl Counter for CollectingCounter {
        fn with(&self, label_values: &[&str]) -> Arc<dyn Counter> {
            self.state.lock().unwrap().last_labels =
                label_values.iter().map(|s| (*s).to_string()).collect();
            Arc::new(self.clone())
        }

        fn add(&self, delta: f64) {
            self.state.lock().unwrap().value += delta;
        }
    }

    #[derive(Default)]
    struct CollectingRetryMetrics {
        retries: CollectingCounter,
    }

    impl RetryMetrics for CollectingRetryMetrics {
        fn service_retries_counter(&self) -> Result<Arc<dyn Counter>, MetricsError> {
            Ok(Arc::new(self.retries.clone()))
        }
    }

    fn request() -> UpstreamRequest {
        hyper::Request::builder()
            .uri("http://backend/")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[test]
    fn counts_each_retry_with_service_label() {
        let metrics = Arc::new(CollectingRetryMetrics::default());
        let listener = MetricsRetryListener::new(metrics.clone(), "serviceName");
        let req = request();

        listener.retried(&req, 1);
        listener.retried(&req, 2);

        let state = metrics.retries.state.lock().unwrap();
        assert!((state.value - 2.0).abs() < f64::EPSILON);
        assert_eq!(state.last_labels, vec!["service", "serviceName"]);
    }

    #[test]
    fn attempt_number_does_not_change_increment() {
        let metrics = Arc::new(CollectingRetryMetrics::default());
        let listener = MetricsRetryListener::new(metrics.clone(), "users");

        listener.retried(&request(), 7);

        let state = metrics.retries.state.lock().unwrap();
        assert!((state.value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn concurrent_retries_all_count() {
        let metrics = Arc::new(CollectingRetryMetrics::default());
        let listener = Arc::new(MetricsRetryListener::new(metrics.clone(), "users"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let listener = Arc::clone(&listener);
                std::thread::spawn(move || {
                    let req = request();
                    for attempt in 1..=25 {
                        listener.retried(&req, attempt);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let state = metrics.retries.state.lock().unwrap();
        assert!((state.value - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unusable_sink_is_a_noop() {
        let listener = MetricsRetryListener::new(Arc::new(DisabledRegistry), "users");
        listener.retried(&request(), 1);
    }
}
