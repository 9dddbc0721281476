//! Integration tests for config loading across all file formats.

use telltale::config::model::Config;
use telltale::config::sources::{parse_config_str, FileSource};
use telltale::config::validation::validate;
use telltale::config::ConfigSource;
use telltale::server::MetricLabels;

fn load_demo(name: &str) -> String {
    let path = format!("demos/{name}");
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"))
}

#[test]
fn yaml_demo_loads_and_validates() {
    let content = load_demo("telltale.yaml");
    let config = parse_config_str("yaml", &content, "telltale.yaml").unwrap();
    validate(&config).unwrap();
    assert_eq!(config.routes[0].service, "users");
    assert_eq!(config.routes[0].retry.attempts, 2);
    assert_eq!(config.total_targets(), 2);
}

#[test]
fn full_demo_compiles_metric_labels() {
    let content = load_demo("full.yaml");
    let config = parse_config_str("yaml", &content, "full.yaml").unwrap();
    validate(&config).unwrap();
    assert_eq!(config.routes.len(), 3);

    let labels = MetricLabels::compile(&config.metrics).unwrap();
    assert!(labels.hosts.keep("api.example.com"));
    assert!(!labels.hosts.keep("api.internal.example.com"));
    assert!(!labels.hosts.keep("www.example.com"));
    assert_eq!(
        labels.paths.template("/v2/services/billing/invoices/7"),
        "/v2/services/billing"
    );
}

#[tokio::test]
async fn file_source_reads_demo() {
    let source = FileSource::open("demos/telltale.yaml").unwrap();
    let (config, version) = source.load().await.unwrap();
    assert_eq!(config.routes.len(), 1);
    assert!(!source.has_changed(&version).await.unwrap());
}

#[cfg(feature = "json")]
#[test]
fn json_demo_loads_and_validates() {
    let content = load_demo("telltale.json");
    let config = parse_config_str("json", &content, "telltale.json").unwrap();
    validate(&config).unwrap();
    assert!(!config.routes.is_empty());
}

#[cfg(feature = "toml")]
#[test]
fn toml_demo_loads_and_validates() {
    let content = load_demo("telltale.toml");
    let config = parse_config_str("toml", &content, "telltale.toml").unwrap();
    validate(&config).unwrap();
    assert!(!config.routes.is_empty());
}

#[cfg(all(feature = "json", feature = "toml"))]
#[test]
fn all_formats_produce_equivalent_configs() {
    let yaml = parse_config_str("yaml", &load_demo("telltale.yaml"), "yaml").unwrap();
    let json = parse_config_str("json", &load_demo("telltale.json"), "json").unwrap();
    let toml = parse_config_str("toml", &load_demo("telltale.toml"), "toml").unwrap();

    for other in [&json, &toml] {
        assert_eq!(yaml.routes.len(), other.routes.len());
        assert_eq!(yaml.total_targets(), other.total_targets());
        assert_eq!(yaml.routes[0].path, other.routes[0].path);
        assert_eq!(yaml.routes[0].service, other.routes[0].service);
        assert_eq!(yaml.routes[0].retry.attempts, other.routes[0].retry.attempts);
    }
}

#[test]
fn unsupported_format_returns_error() {
    assert!(parse_config_str("xml", "{}", "test.xml").is_err());
}

#[test]
fn invalid_config_fails_validation() {
    let empty = r#"{"routes": []}"#;
    let config: Config = serde_json::from_str(empty).unwrap();
    assert!(validate(&config).is_err());
}

#[test]
fn routes_require_a_service() {
    let json = r#"{"routes": [{"path": "/a", "targets": [{"url": "http://a:80"}]}]}"#;
    assert!(serde_json::from_str::<Config>(json).is_err());
}

#[test]
fn config_total_targets_counts_correctly() {
    let json = r#"{
        "routes": [
            {"path": "/a", "service": "a", "targets": [{"url": "http://a:80"}, {"url": "http://b:80"}]},
            {"path": "/b", "service": "b", "targets": [{"url": "http://c:80"}]}
        ]
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.total_targets(), 3);
}
