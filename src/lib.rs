//! Telltale is an HTTP reverse proxy that attaches per-service metrics to
//! every backend call.
//!
//! It matches incoming requests against configured routes, forwards them
//! to the route's targets with bounded retries, and records request count,
//! duration, and retry count per service. Label cardinality is bounded by
//! host filtering and path templating, and the response wrapper keeps the
//! client-disconnect signal available to the upstream call.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Configuration loading, validation, and hot-reloading via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler returning runtime diagnostics.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`metrics`] -- Counter and histogram instruments and their registries.
//! - [`middleware`] -- Host filter, path templating, request metrics, the
//!   response recorder, and the retry listener.
//! - [`proxy`] -- Core HTTP forwarding: route matching, header construction,
//!   retries, and the per-request response writers.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod server;
