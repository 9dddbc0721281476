//! Unified error types for telltale.
//!
//! Defines [`TelltaleError`] (the main crate error enum) and
//! [`ValidationError`] for config validation failures. These cover
//! startup, configuration and CLI paths only: request-path failures are
//! turned into proxy responses and metric failures are swallowed where
//! they happen.

use std::path::PathBuf;

use crate::metrics::MetricsError;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub route: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}: {}: {}", self.route, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TelltaleError {
    #[error("No config source found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid pattern in {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_includes_suggestion() {
        let err = ValidationError {
            route: "test".into(),
            field: "path".into(),
            message: "path must start with '/'".into(),
            suggestion: Some("did you mean '/test'?".into()),
        };
        assert_eq!(
            err.to_string(),
            "  test: path: path must start with '/' (did you mean '/test'?)"
        );
    }

    #[test]
    fn config_validation_lists_every_error() {
        let errors = vec![
            ValidationError {
                route: "/a".into(),
                field: "service".into(),
                message: "service name cannot be empty".into(),
                suggestion: None,
            },
            ValidationError {
                route: "/b".into(),
                field: "targets".into(),
                message: "at least one target must be defined".into(),
                suggestion: None,
            },
        ];
        let text = TelltaleError::ConfigValidation { errors }.to_string();
        assert!(text.contains("/a: service"));
        assert!(text.contains("/b: targets"));
    }
}
