//! Bounded-cardinality path labels.
//!
//! [`PathTemplater`] maps a request path to the label value used by the
//! request metrics. Paths shaped like `/<version>/<kind>/<name>/...` are
//! truncated after the third segment; everything else is kept verbatim.
//! The version rule and the list of resource kinds come from config.

use axum::http::Uri;
use regex::Regex;

use crate::config::model::PathRules;

/// Label value for requests that carry no path at all.
pub const UNDEFINED_PATH: &str = "undefined";

#[derive(Debug, Clone)]
pub struct PathTemplater {
    shape: Regex,
    version: Regex,
}

impl PathTemplater {
    /// Compile the recognition rule. Fails only when `rules.version` is not
    /// a valid regular expression.
    pub fn new(rules: &PathRules) -> Result<Self, regex::Error> {
        Ok(Self {
            shape: Regex::new(&shape_pattern(rules))?,
            version: Regex::new(&format!("^(?:{})$", rules.version))?,
        })
    }

    #[must_use]
    pub fn template(&self, path: &str) -> String {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        if path.is_empty() || path == "/" {
            return UNDEFINED_PATH.to_string();
        }

        // The version rule is checked against one segment only, so a rule
        // like `.*` cannot swallow the rest of the path.
        match self.shape.captures(path) {
            Some(caps) if self.version.is_match(&caps[1]) => caps[0].to_string(),
            _ => path.to_string(),
        }
    }

    #[must_use]
    pub fn template_for_uri(&self, uri: &Uri) -> String {
        self.template(uri.path())
    }
}

/// `^/([^/]+)/(?:<kind>|...)/[^/]+`, anchored so only the leading three
/// segments are captured. The first group is the version segment.
fn shape_pattern(rules: &PathRules) -> String {
    let kinds = if rules.kinds.is_empty() {
        "[^/]+".to_string()
    } else {
        rules
            .kinds
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|")
    };
    format!("^/([^/]+)/(?:{kinds})/[^/]+")
}
