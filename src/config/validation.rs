//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors such as empty routes, invalid paths, duplicate entries, bad HTTP
//! methods, missing service names, malformed target URLs, and metric label
//! rules that do not compile. Returns a list of [`ValidationError`] values
//! with per-field suggestions.

use url::Url;

use super::model::{Config, MetricsConfig};
use crate::error::ValidationError;
use crate::middleware::host_filter::compile_pattern;
use crate::middleware::path_template::PathTemplater;

pub const VALID_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "*",
];

pub const MAX_RETRY_ATTEMPTS: u32 = 10;

const RESERVED_PATHS: &[&str] = &["/health"];

/// Validate a single route path. Returns `Ok(())` or a human-readable error.
pub fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path cannot be empty".into());
    }
    if !path.starts_with('/') && path != "*" {
        return Err(format!(
            "path must start with '/' or be '*' (did you mean '/{path}'?)"
        ));
    }
    Ok(())
}

/// The metrics endpoint is mounted as a literal router path, so it cannot
/// carry captures or wildcards.
fn validate_static_path(path: &str) -> Result<(), String> {
    if path.contains(['{', '}']) {
        return Err(format!("'{path}' must not contain '{{' or '}}'"));
    }
    match path
        .split('/')
        .find(|segment| segment.starts_with([':', '*']))
    {
        Some(segment) => Err(format!(
            "segment '{segment}' must not start with ':' or '*'"
        )),
        None => Ok(()),
    }
}

/// Validate a single target URL. Returns `Ok(())` or a human-readable error.
pub fn validate_target_url(url: &str) -> Result<(), String> {
    let test_url = replace_params_for_validation(url);
    match Url::parse(&test_url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{url}' is not a valid URL")),
    }
}

/// Validate an HTTP method string. Returns `Ok(())` or a human-readable error.
pub fn validate_method(method: &str) -> Result<(), String> {
    let upper = method.to_uppercase();
    if VALID_METHODS.contains(&upper.as_str()) {
        Ok(())
    } else {
        Err(format!("'{method}' is not a valid HTTP method"))
    }
}

fn metrics_error(field: &str, message: String, suggestion: Option<String>) -> ValidationError {
    ValidationError {
        route: "(metrics)".into(),
        field: field.into(),
        message,
        suggestion,
    }
}

fn validate_metrics(metrics: &MetricsConfig, errors: &mut Vec<ValidationError>) {
    if !metrics.path.starts_with('/') {
        errors.push(metrics_error(
            "metrics.path",
            "path must start with '/'".into(),
            Some(format!("did you mean '/{}'?", metrics.path)),
        ));
    } else if RESERVED_PATHS.contains(&metrics.path.as_str()) {
        errors.push(metrics_error(
            "metrics.path",
            format!("'{}' is reserved", metrics.path),
            None,
        ));
    } else if let Err(msg) = validate_static_path(&metrics.path) {
        errors.push(metrics_error("metrics.path", msg, None));
    }

    let patterns = [
        ("metrics.hosts.keep", &metrics.hosts.keep),
        ("metrics.hosts.drop", &metrics.hosts.drop),
    ];
    for (field, list) in patterns {
        for pattern in list {
            if let Err(e) = compile_pattern(pattern) {
                errors.push(metrics_error(
                    field,
                    format!("'{pattern}' is not a valid regular expression: {e}"),
                    None,
                ));
            }
        }
    }

    if metrics.paths.version.is_empty() {
        errors.push(metrics_error(
            "metrics.paths.version",
            "version rule cannot be empty".into(),
            Some(format!("the default is '{}'", super::model::DEFAULT_VERSION_RULE)),
        ));
    } else if let Err(e) = PathTemplater::new(&metrics.paths) {
        errors.push(metrics_error(
            "metrics.paths.version",
            format!("not a valid regular expression: {e}"),
            None,
        ));
    }

    for kind in &metrics.paths.kinds {
        if kind.is_empty() || kind.contains('/') {
            errors.push(metrics_error(
                "metrics.paths.kinds",
                format!("'{kind}' must be a single non-empty path segment"),
                None,
            ));
        }
    }
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_metrics(&config.metrics, &mut errors);

    if config.routes.is_empty() {
        errors.push(ValidationError {
            route: "(root)".into(),
            field: "routes".into(),
            message: "at least one route must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_paths = std::collections::HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let route_id = if route.path.is_empty() {
            format!("routes[{i}]")
        } else {
            route.path.clone()
        };

        if let Err(msg) = validate_path(&route.path) {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "path".into(),
                message: msg,
                suggestion: if !route.path.is_empty() && !route.path.starts_with('/') {
                    Some(format!("did you mean '/{}'?", route.path))
                } else {
                    None
                },
            });
        }

        if !seen_paths.insert(&route.path) {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "path".into(),
                message: "duplicate route path".into(),
                suggestion: None,
            });
        }

        if config.metrics.enabled && route.path == config.metrics.path {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "path".into(),
                message: "path is shadowed by the metrics endpoint".into(),
                suggestion: Some("change metrics.path or the route path".into()),
            });
        }

        for method in &route.methods {
            if let Err(msg) = validate_method(method) {
                errors.push(ValidationError {
                    route: route_id.clone(),
                    field: "methods".into(),
                    message: msg,
                    suggestion: None,
                });
            }
        }

        if route.service.trim().is_empty() {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "service".into(),
                message: "service name cannot be empty".into(),
                suggestion: Some("name the backend, e.g. 'users'".into()),
            });
        }

        if route.retry.attempts > MAX_RETRY_ATTEMPTS {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "retry.attempts".into(),
                message: format!(
                    "{} retry attempts requested, at most {MAX_RETRY_ATTEMPTS} allowed",
                    route.retry.attempts
                ),
                suggestion: None,
            });
        }

        if route.targets.is_empty() {
            errors.push(ValidationError {
                route: route_id.clone(),
                field: "targets".into(),
                message: "at least one target must be defined".into(),
                suggestion: None,
            });
        }

        for target in &route.targets {
            if let Err(msg) = validate_target_url(&target.url) {
                errors.push(ValidationError {
                    route: route_id.clone(),
                    field: "targets.url".into(),
                    message: msg,
                    suggestion: None,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Replace `:param` patterns with a valid placeholder for URL validation.
fn replace_params_for_validation(url: &str) -> String {
    let mut result = String::with_capacity(url.len());
    let mut chars = url.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == ':' && chars.peek().is_some_and(|c| c.is_alphabetic() || *c == '_') {
            result.push_str("_p");
            while chars
                .peek()
                .is_some_and(|c| c.is_alphanumeric() || *c == '_')
            {
                chars.next();
            }
        } else {
            result.push(ch);
        }
    }
    result
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let total_targets = config.total_targets();
    let mut lines = vec![format!(
        "  {} routes, {} targets\n",
        config.routes.len(),
        total_targets
    )];

    for route in &config.routes {
        let first_url = route.targets.first().map_or("none", |t| t.url.as_str());
        let methods = route.methods.join(", ");
        let timeout = route.timeout.map_or_else(
            || format!("{}ms (default)", config.defaults.timeout),
            |t| format!("{t}ms"),
        );

        lines.push(format!(
            "  {}  -> {} ({} targets, first: {})",
            route.path,
            route.service,
            route.targets.len(),
            first_url,
        ));
        lines.push(format!("    methods: {methods}"));
        lines.push(format!("    timeout: {timeout}"));
        lines.push(format!("    retries: {}", route.retry.attempts));
    }

    let metrics = if config.metrics.enabled {
        format!("\n  metrics: {}", config.metrics.path)
    } else {
        "\n  metrics: disabled".to_string()
    };

    format!("{} is valid\n{}{metrics}", path, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{
        Config, Defaults, HostRules, MetricsConfig, PathRules, RetryConfig, Route, Target,
    };

    fn route(path: &str) -> Route {
        Route {
            path: path.into(),
            methods: vec!["*".into()],
            service: "users".into(),
            timeout: None,
            retry: RetryConfig::default(),
            headers: Default::default(),
            targets: vec![Target {
                url: "http://localhost:8080/test".into(),
                timeout: None,
            }],
        }
    }

    fn config_with(routes: Vec<Route>) -> Config {
        Config {
            metrics: MetricsConfig::default(),
            defaults: Defaults::default(),
            routes,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&config_with(vec![route("/test")])).is_ok());
    }

    #[test]
    fn empty_routes_fails() {
        let errors = validate(&config_with(vec![])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("at least one route"));
    }

    #[test]
    fn empty_targets_fails() {
        let mut r = route("/test");
        r.targets.clear();
        let errors = validate(&config_with(vec![r])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("at least one target")));
    }

    #[test]
    fn empty_service_fails() {
        let mut r = route("/test");
        r.service = "  ".into();
        let errors = validate(&config_with(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "service"));
    }

    #[test]
    fn too_many_retries_fails() {
        let mut r = route("/test");
        r.retry.attempts = MAX_RETRY_ATTEMPTS + 1;
        let errors = validate(&config_with(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "retry.attempts"));
    }

    #[test]
    fn invalid_url_fails() {
        let mut r = route("/test");
        r.targets[0].url = "not a url".into();
        let errors = validate(&config_with(vec![r])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("not a valid URL")));
    }

    #[test]
    fn path_without_slash_fails() {
        let errors = validate(&config_with(vec![route("test")])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.suggestion.as_deref() == Some("did you mean '/test'?")));
    }

    #[test]
    fn invalid_method_fails() {
        let mut r = route("/test");
        r.methods = vec!["INVALID".into()];
        let errors = validate(&config_with(vec![r])).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("not a valid HTTP method")));
    }

    #[test]
    fn invalid_host_pattern_fails() {
        let mut config = config_with(vec![route("/test")]);
        config.metrics.hosts = HostRules {
            keep: vec!["(".into()],
            drop: vec![],
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "metrics.hosts.keep"));
    }

    #[test]
    fn invalid_version_rule_fails() {
        let mut config = config_with(vec![route("/test")]);
        config.metrics.paths = PathRules {
            version: "v[".into(),
            kinds: vec!["service".into()],
        };
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "metrics.paths.version"));
    }

    #[test]
    fn kind_with_slash_fails() {
        let mut config = config_with(vec![route("/test")]);
        config.metrics.paths.kinds = vec!["a/b".into()];
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "metrics.paths.kinds"));
    }

    #[test]
    fn reserved_metrics_path_fails() {
        let mut config = config_with(vec![route("/test")]);
        config.metrics.path = "/health".into();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("reserved")));
    }

    #[test]
    fn metrics_path_with_captures_fails() {
        for path in ["/:stats", "/internal/*rest", "/{stats}", "/a}"] {
            let mut config = config_with(vec![route("/test")]);
            config.metrics.path = path.into();
            let errors = validate(&config).unwrap_err();
            assert!(
                errors.iter().any(|e| e.field == "metrics.path"),
                "path {path}"
            );
        }
    }

    #[test]
    fn nested_metrics_path_passes() {
        let mut config = config_with(vec![route("/test")]);
        config.metrics.path = "/internal/metrics".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn route_shadowed_by_metrics_fails() {
        let errors = validate(&config_with(vec![route("/metrics")])).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("shadowed")));
    }

    #[test]
    fn metrics_path_is_free_when_disabled() {
        let mut config = config_with(vec![route("/metrics")]);
        config.metrics.enabled = false;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn report_lists_service_and_retries() {
        let mut r = route("/test");
        r.retry.attempts = 2;
        let report = format_validation_report("telltale.yaml", &config_with(vec![r]));
        assert!(report.contains("-> users"));
        assert!(report.contains("retries: 2"));
        assert!(report.contains("metrics: /metrics"));
    }
}
