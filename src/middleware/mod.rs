//! Observability middleware around backend calls.
//!
//! - [`host_filter`] decides from the request host whether a request is
//!   metered at all.
//! - [`path_template`] reduces request paths to bounded label values.
//! - [`metrics`] is the Axum middleware recording per-service request
//!   count and duration with those labels.
//! - [`recorder`] wraps the proxy's response writer, recording the status
//!   and keeping the client-disconnect capability intact.
//! - [`retry_listener`] counts retries per service for the proxy's retry
//!   loop.

pub mod host_filter;
pub mod metrics;
pub mod path_template;
pub mod recorder;
pub mod retry_listener;
