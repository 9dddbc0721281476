//! Serde data structures for the telltale configuration file.
//!
//! Contains [`Config`] (the root), [`MetricsConfig`] with its
//! [`HostRules`] and [`PathRules`], [`Route`], [`Target`], [`Defaults`],
//! and [`HeaderRules`]. All types derive `Serialize` and `Deserialize`
//! with `deny_unknown_fields` for strict parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_VERSION_RULE: &str = r"v[0-9]+(\.[0-9]+)*";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_true() -> bool {
    true
}

fn default_methods() -> Vec<String> {
    vec!["*".to_string()]
}

fn is_default_timeout(v: &u64) -> bool {
    *v == default_timeout()
}

fn is_true(v: &bool) -> bool {
    *v
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_default_methods(v: &[String]) -> bool {
    v.len() == 1 && v[0] == "*"
}

fn is_default_defaults(v: &Defaults) -> bool {
    v.timeout == default_timeout()
        && v.forward_headers
        && v.proxy_headers
        && v.strip_hop_by_hop
        && v.cancel_on_disconnect
        && v.headers.is_default()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "MetricsConfig::is_default")]
    pub metrics: MetricsConfig,

    #[serde(default, skip_serializing_if = "is_default_defaults")]
    pub defaults: Defaults,

    pub routes: Vec<Route>,
}

impl Config {
    #[must_use]
    pub fn total_targets(&self) -> usize {
        self.routes.iter().map(|r| r.targets.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Where the Prometheus exposition is served.
    pub path: String,

    pub hosts: HostRules,

    pub paths: PathRules,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_METRICS_PATH.to_string(),
            hosts: HostRules::default(),
            paths: PathRules::default(),
        }
    }
}

impl MetricsConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Which request hosts contribute to request metrics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostRules {
    /// Regular expressions; a host must match one of them. Empty keeps all.
    pub keep: Vec<String>,

    /// Regular expressions; a matching host is never kept.
    pub drop: Vec<String>,
}

impl Default for HostRules {
    fn default() -> Self {
        Self {
            keep: vec![r"^api\.".to_string()],
            drop: Vec::new(),
        }
    }
}

/// How request paths are reduced to `/<version>/<kind>/<name>` templates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathRules {
    /// Regular expression a whole version segment must match.
    pub version: String,

    /// Literal resource kinds recognized in the second segment. Empty
    /// accepts any kind.
    pub kinds: Vec<String>,
}

impl Default for PathRules {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION_RULE.to_string(),
            kinds: vec!["service".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    #[serde(
        default = "default_timeout",
        skip_serializing_if = "is_default_timeout"
    )]
    pub timeout: u64,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub forward_headers: bool,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub proxy_headers: bool,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub strip_hop_by_hop: bool,

    /// Abandon the upstream call when the client disconnects.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub cancel_on_disconnect: bool,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            forward_headers: default_true(),
            proxy_headers: default_true(),
            strip_hop_by_hop: default_true(),
            cancel_on_disconnect: default_true(),
            headers: HeaderRules::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub path: String,

    #[serde(
        default = "default_methods",
        skip_serializing_if = "is_default_methods"
    )]
    pub methods: Vec<String>,

    /// Backend identity used as the `service` metric label.
    pub service: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "RetryConfig::is_default")]
    pub retry: RetryConfig,

    #[serde(default, skip_serializing_if = "HeaderRules::is_default")]
    pub headers: HeaderRules,

    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Re-issues allowed after the first try. Zero disables retries.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
}

impl RetryConfig {
    fn is_default(&self) -> bool {
        self.attempts == 0
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderRules {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub add: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strip: Vec<String>,
}

impl HeaderRules {
    fn is_default(&self) -> bool {
        self.add.is_empty() && self.strip.is_empty()
    }
}
