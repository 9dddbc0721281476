//! Bounded retry loop for upstream calls.
//!
//! [`execute`] re-issues a request while the failure is [`Retryable`] and
//! attempts remain, notifying a [`RetryListener`] before every re-issue.
//! There is no backoff; each retry goes out immediately.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::upstream::UpstreamRequest;
use crate::server::Stats;

/// Observer of retries. `attempt` is 1 for the first retry.
pub trait RetryListener: Send + Sync {
    fn retried(&self, req: &UpstreamRequest, attempt: u32);
}

/// Fans one retry notification out to several listeners, in insertion order.
#[derive(Default)]
pub struct RetryListeners(Vec<Box<dyn RetryListener>>);

impl RetryListeners {
    pub fn push(&mut self, listener: impl RetryListener + 'static) {
        self.0.push(Box::new(listener));
    }
}

impl RetryListener for RetryListeners {
    fn retried(&self, req: &UpstreamRequest, attempt: u32) {
        for listener in &self.0 {
            listener.retried(req, attempt);
        }
    }
}

/// Feeds the `retries` figure reported by `/health`.
pub struct StatsRetryListener(pub Arc<Stats>);

impl RetryListener for StatsRetryListener {
    fn retried(&self, _req: &UpstreamRequest, _attempt: u32) {
        self.0.retries.fetch_add(1, Ordering::Relaxed);
    }
}

pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `send` on the request produced by `build(attempt)` until it
/// succeeds, fails with a non-retryable error, or `retries` re-issues have
/// been made. Errors from `build` end the loop.
pub async fn execute<T, E, B, S, Fut>(
    retries: u32,
    listener: &dyn RetryListener,
    mut build: B,
    mut send: S,
) -> Result<T, E>
where
    B: FnMut(u32) -> Result<UpstreamRequest, E>,
    S: FnMut(UpstreamRequest) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 0;
    loop {
        let req = build(attempt)?;
        if attempt > 0 {
            listener.retried(&req, attempt);
        }

        match send(req).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && e.is_retryable() => {
                tracing::debug!(attempt, error = %e, "upstream attempt failed");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
