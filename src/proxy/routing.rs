//! Specificity-based route matching for incoming HTTP requests.
//!
//! Exact segments score 10, `:param` segments 5, a `/prefix/*` route 10
//! per prefix segment, and the catch-all (`/*` or `*`) 0. The highest score
//! wins; ties go to the route listed first.

use std::collections::HashMap;

use crate::config::model::Route;

#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

enum Pattern<'a> {
    CatchAll,
    Prefix(Vec<&'a str>),
    Segments(Vec<&'a str>),
}

impl<'a> Pattern<'a> {
    fn parse(path: &'a str) -> Self {
        if path == "/*" || path == "*" {
            Self::CatchAll
        } else if let Some(prefix) = path.strip_suffix("/*") {
            Self::Prefix(segments(prefix))
        } else {
            Self::Segments(segments(path))
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn score(&self, request: &[&str]) -> Option<(i32, HashMap<String, String>)> {
        match self {
            Self::CatchAll => Some((0, HashMap::new())),
            Self::Prefix(prefix) => {
                let matches = request.len() >= prefix.len()
                    && prefix.iter().zip(request).all(|(p, r)| p == r);
                matches.then(|| (prefix.len() as i32 * 10, HashMap::new()))
            }
            Self::Segments(route) => {
                if route.len() != request.len() {
                    return None;
                }
                let mut params = HashMap::new();
                let mut score = 0;
                for (rs, qs) in route.iter().zip(request) {
                    if let Some(name) = rs.strip_prefix(':') {
                        params.insert(name.to_string(), (*qs).to_string());
                        score += 5;
                    } else if rs == qs {
                        score += 10;
                    } else {
                        return None;
                    }
                }
                Some((score, params))
            }
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn method_matches(methods: &[String], method: &str) -> bool {
    methods
        .iter()
        .any(|m| m == "*" || m.eq_ignore_ascii_case(method))
}

#[must_use]
pub fn match_route<'a>(routes: &'a [Route], path: &str, method: &str) -> Option<RouteMatch<'a>> {
    let request = segments(path);

    let mut best: Option<(i32, RouteMatch<'a>)> = None;
    for route in routes.iter().filter(|r| method_matches(&r.methods, method)) {
        let Some((score, params)) = Pattern::parse(&route.path).score(&request) else {
            continue;
        };
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, RouteMatch { route, params }));
        }
    }

    best.map(|(_, matched)| matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{RetryConfig, Target};

    fn route(path: &str, methods: &[&str]) -> Route {
        Route {
            path: path.into(),
            methods: methods.iter().map(|s| s.to_string()).collect(),
            service: format!("svc{path}"),
            timeout: None,
            retry: RetryConfig::default(),
            headers: Default::default(),
            targets: vec![Target {
                url: "http://localhost:8080".into(),
                timeout: None,
            }],
        }
    }

    #[test]
    fn exact_match() {
        let routes = vec![route("/orders", &["*"])];
        let matched = match_route(&routes, "/orders", "GET").unwrap();
        assert_eq!(matched.route.path, "/orders");
        assert!(matched.params.is_empty());
    }

    #[test]
    fn parameterized_match() {
        let routes = vec![route("/orders/:id", &["*"])];
        let matched = match_route(&routes, "/orders/42", "GET").unwrap();
        assert_eq!(matched.params.get("id").unwrap(), "42");
    }

    #[test]
    fn wildcard_prefix_match() {
        let routes = vec![route("/qa/*", &["*"])];
        assert!(match_route(&routes, "/qa/anything/deep", "GET").is_some());
        assert!(match_route(&routes, "/other", "GET").is_none());
    }

    #[test]
    fn catch_all_match() {
        let routes = vec![route("/*", &["*"])];
        assert!(match_route(&routes, "/anything/at/all", "POST").is_some());
        assert!(match_route(&routes, "/", "GET").is_some());
    }

    #[test]
    fn exact_beats_wildcard() {
        let routes = vec![route("/*", &["*"]), route("/orders", &["*"])];
        let matched = match_route(&routes, "/orders", "GET").unwrap();
        assert_eq!(matched.route.path, "/orders");
    }

    #[test]
    fn parameterized_beats_wildcard() {
        let routes = vec![route("/*", &["*"]), route("/orders/:id", &["*"])];
        let matched = match_route(&routes, "/orders/42", "GET").unwrap();
        assert_eq!(matched.route.path, "/orders/:id");
    }

    #[test]
    fn ties_go_to_first_route() {
        let mut first = route("/orders/:id", &["*"]);
        first.service = "first".into();
        let mut second = route("/orders/:key", &["*"]);
        second.service = "second".into();
        let routes = vec![first, second];
        let matched = match_route(&routes, "/orders/1", "GET").unwrap();
        assert_eq!(matched.route.service, "first");
    }

    #[test]
    fn method_filter() {
        let routes = vec![route("/orders", &["POST"])];
        assert!(match_route(&routes, "/orders", "GET").is_none());
        assert!(match_route(&routes, "/orders", "post").is_some());
    }

    #[test]
    fn no_match() {
        let routes = vec![route("/orders", &["*"])];
        assert!(match_route(&routes, "/products", "GET").is_none());
    }
}
