//! Integration tests for route matching.

use telltale::config::model::{Defaults, RetryConfig, Route, Target};
use telltale::proxy::routing::match_route;

fn make_route(service: &str, path: &str, methods: &[&str]) -> Route {
    Route {
        path: path.into(),
        methods: methods.iter().map(|s| (*s).to_string()).collect(),
        service: service.into(),
        timeout: None,
        retry: RetryConfig::default(),
        headers: Default::default(),
        targets: vec![Target {
            url: "http://localhost:8080".into(),
            timeout: None,
        }],
    }
}

fn service_for<'a>(routes: &'a [Route], path: &str, method: &str) -> Option<&'a str> {
    match_route(routes, path, method).map(|m| m.route.service.as_str())
}

#[test]
fn specificity_ordering_comprehensive() {
    let routes = vec![
        make_route("catch-all", "/*", &["*"]),
        make_route("prefix", "/api/*", &["*"]),
        make_route("param", "/api/users/:id", &["*"]),
        make_route("exact", "/api/users/me", &["*"]),
    ];

    assert_eq!(service_for(&routes, "/api/users/me", "GET"), Some("exact"));

    let matched = match_route(&routes, "/api/users/42", "GET").unwrap();
    assert_eq!(matched.route.service, "param");
    assert_eq!(matched.params["id"], "42");

    assert_eq!(
        service_for(&routes, "/api/other/deep/path", "GET"),
        Some("prefix")
    );
    assert_eq!(
        service_for(&routes, "/something/else", "GET"),
        Some("catch-all")
    );
}

#[test]
fn method_filtering_restricts_matches() {
    let routes = vec![
        make_route("reader", "/orders", &["GET"]),
        make_route("writer", "/orders", &["POST"]),
    ];

    assert_eq!(service_for(&routes, "/orders", "GET"), Some("reader"));
    assert_eq!(service_for(&routes, "/orders", "POST"), Some("writer"));
    assert!(match_route(&routes, "/orders", "DELETE").is_none());
}

#[test]
fn multi_segment_params() {
    let routes = vec![make_route(
        "items",
        "/users/:user_id/orders/:order_id/items/:item_id",
        &["*"],
    )];

    let matched = match_route(&routes, "/users/1/orders/2/items/3", "GET").unwrap();
    assert_eq!(matched.params.len(), 3);
    assert_eq!(matched.params["user_id"], "1");
    assert_eq!(matched.params["order_id"], "2");
    assert_eq!(matched.params["item_id"], "3");
}

#[test]
fn query_string_does_not_affect_matching() {
    let routes = vec![make_route("users", "/v1.2/service/users", &["*"])];
    // The handler passes `uri.path()`, which never carries the query
    let uri: axum::http::Uri = "/v1.2/service/users?page=2".parse().unwrap();
    assert_eq!(service_for(&routes, uri.path(), "GET"), Some("users"));
}

#[test]
fn empty_routes_returns_none() {
    let routes: Vec<Route> = vec![];
    assert!(match_route(&routes, "/anything", "GET").is_none());
}

#[test]
fn defaults_are_sensible() {
    let defaults = Defaults::default();
    assert_eq!(defaults.timeout, 5000);
    assert!(defaults.forward_headers);
    assert!(defaults.proxy_headers);
    assert!(defaults.strip_hop_by_hop);
    assert!(defaults.cancel_on_disconnect);
}
