//! Host extraction and the keep/skip decision for request metrics.
//!
//! Administrative and apex hosts are excluded from user-facing metrics by
//! policy. The policy is a pair of pattern lists from config: a host is
//! kept when it matches some `keep` pattern (or the list is empty) and no
//! `drop` pattern.

use axum::http::uri::Authority;
use axum::http::{header, HeaderMap, Uri};
use regex::{Regex, RegexSet};

use crate::config::model::HostRules;

/// The hostname a request targets, without user-info or port, lowercased.
///
/// Absolute-form request targets win over the `Host` header.
#[must_use]
pub fn request_host(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let Some(authority) = uri.authority() {
        return hostname(authority);
    }

    let value = headers.get(header::HOST)?.to_str().ok()?;
    let authority: Authority = value.parse().ok()?;
    hostname(&authority)
}

fn hostname(authority: &Authority) -> Option<String> {
    let host = authority.host();
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct HostFilter {
    keep: RegexSet,
    drop: RegexSet,
}

impl HostFilter {
    pub fn new(rules: &HostRules) -> Result<Self, regex::Error> {
        Ok(Self {
            keep: RegexSet::new(&rules.keep)?,
            drop: RegexSet::new(&rules.drop)?,
        })
    }

    /// Whether metrics should be recorded for requests to `host`.
    #[must_use]
    pub fn keep(&self, host: &str) -> bool {
        if host.is_empty() {
            return false;
        }
        let kept = self.keep.is_empty() || self.keep.is_match(host);
        kept && !self.drop.is_match(host)
    }
}

/// Check a single pattern the same way [`HostFilter::new`] compiles it.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}
