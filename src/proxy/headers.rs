//! Request headers sent upstream and response headers sent back.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::model::{Defaults, HeaderRules, Route};

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
    "proxy-authenticate",
];

const VIA: &str = "1.1 telltale";

/// Strip hop-by-hop headers and `content-length` from an upstream response.
/// The body is re-framed by axum once it has been collected.
pub fn strip_response_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
}

/// Everything about the inbound request that shapes the upstream headers.
#[derive(Debug, Clone, Copy)]
pub struct ForwardContext<'a> {
    pub original: &'a HeaderMap,
    pub client_ip: &'a str,
    pub correlation_id: &'a str,
    pub route: &'a Route,
    pub defaults: &'a Defaults,
}

impl ForwardContext<'_> {
    /// Headers for a request to `target`. Default rules apply before the
    /// route's own, so a route can re-add what the defaults strip.
    #[must_use]
    pub fn headers_for(&self, target: &url::Url) -> HeaderMap {
        let mut headers = if self.defaults.forward_headers {
            self.original.clone()
        } else {
            HeaderMap::new()
        };

        if self.defaults.strip_hop_by_hop {
            for name in HOP_BY_HOP {
                headers.remove(name);
            }
        }

        if let Some(host) = target.host_str() {
            let authority = target
                .port()
                .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
            set(&mut headers, header::HOST, &authority);
        }

        if self.defaults.proxy_headers {
            self.add_proxy_headers(&mut headers, target);
        }

        apply_rules(&mut headers, &self.defaults.headers, "defaults");
        apply_rules(&mut headers, &self.route.headers, self.route.path.as_str());
        headers
    }

    fn add_proxy_headers(&self, headers: &mut HeaderMap, target: &url::Url) {
        let chain = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {}", self.client_ip),
            None => self.client_ip.to_string(),
        };
        let real_ip = chain.split(',').next().unwrap_or(self.client_ip).trim().to_string();
        set(headers, HeaderName::from_static("x-forwarded-for"), &chain);
        set(headers, HeaderName::from_static("x-real-ip"), &real_ip);

        let proto = if target.scheme() == "https" { "https" } else { "http" };
        set(headers, HeaderName::from_static("x-forwarded-proto"), proto);

        if let Some(host) = self.original.get(header::HOST) {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
        }
        set(headers, header::VIA, VIA);
        set(
            headers,
            HeaderName::from_static("x-correlation-id"),
            self.correlation_id,
        );
    }
}

fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn apply_rules(headers: &mut HeaderMap, rules: &HeaderRules, scope: &str) {
    for (key, value) in &rules.add {
        match (key.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(scope, header = %key, "invalid header rule, skipping"),
        }
    }
    for key in &rules.strip {
        if let Ok(name) = key.parse::<HeaderName>() {
            headers.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{RetryConfig, Target};

    fn route() -> Route {
        Route {
            path: "/test".into(),
            methods: vec!["*".into()],
            service: "test".into(),
            timeout: None,
            retry: RetryConfig::default(),
            headers: HeaderRules::default(),
            targets: vec![Target {
                url: "http://target:8080/test".into(),
                timeout: None,
            }],
        }
    }

    fn forward(original: &HeaderMap, route: &Route, defaults: &Defaults, target: &str) -> HeaderMap {
        let ctx = ForwardContext {
            original,
            client_ip: "10.0.0.1",
            correlation_id: "corr-1",
            route,
            defaults,
        };
        ctx.headers_for(&url::Url::parse(target).unwrap())
    }

    #[test]
    fn strips_hop_by_hop() {
        let mut original = HeaderMap::new();
        original.insert("connection", "keep-alive".parse().unwrap());
        original.insert("content-type", "application/json".parse().unwrap());

        let result = forward(&original, &route(), &Defaults::default(), "http://target:8080");
        assert!(result.get("connection").is_none());
        assert!(result.get("content-type").is_some());
    }

    #[test]
    fn rewrites_host_and_keeps_original_as_forwarded_host() {
        let mut original = HeaderMap::new();
        original.insert("host", "api.example.com".parse().unwrap());

        let result = forward(&original, &route(), &Defaults::default(), "http://backend:9090/path");
        assert_eq!(result["host"], "backend:9090");
        assert_eq!(result["x-forwarded-host"], "api.example.com");
    }

    #[test]
    fn appends_x_forwarded_for() {
        let mut original = HeaderMap::new();
        original.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());

        let result = forward(&original, &route(), &Defaults::default(), "http://target:8080");
        assert_eq!(result["x-forwarded-for"], "1.2.3.4, 10.0.0.1");
        assert_eq!(result["x-real-ip"], "1.2.3.4");
    }

    #[test]
    fn sets_via_and_correlation_id() {
        let result = forward(&HeaderMap::new(), &route(), &Defaults::default(), "https://target");
        assert_eq!(result["via"], "1.1 telltale");
        assert_eq!(result["x-correlation-id"], "corr-1");
        assert_eq!(result["x-forwarded-proto"], "https");
    }

    #[test]
    fn route_rules_follow_default_rules() {
        let mut defaults = Defaults::default();
        defaults.headers.strip.push("x-internal".into());
        let mut route = route();
        route.headers.add.insert("x-internal".into(), "route".into());
        route.headers.add.insert("x-custom".into(), "value".into());

        let result = forward(&HeaderMap::new(), &route, &defaults, "http://target:8080");
        assert_eq!(result["x-internal"], "route");
        assert_eq!(result["x-custom"], "value");
    }

    #[test]
    fn response_framing_headers_are_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("content-length", "10".parse().unwrap());
        headers.insert("etag", "\"abc\"".parse().unwrap());

        strip_response_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("etag"));
    }
}
