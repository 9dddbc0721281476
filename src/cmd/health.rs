//! `telltale health`: check the health of a running instance.
//!
//! Sends a `GET /health` request to the specified URL and displays
//! the response as a summary or raw JSON.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::TelltaleError;
use crate::health::HealthResponse;

const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn execute(args: HealthArgs) -> Result<(), TelltaleError> {
    let body = fetch(&args.url).await?;

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => println!("{}", summary(&args.url, &health)),
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }
    Ok(())
}

async fn fetch(base: &str) -> Result<Bytes, TelltaleError> {
    let http_error = |e: Box<dyn std::error::Error + Send + Sync>| TelltaleError::HttpRequest { source: e };

    let uri: hyper::Uri = format!("{}/health", base.trim_end_matches('/'))
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| TelltaleError::UriParse {
            source: Box::new(e),
        })?;
    let req = hyper::Request::builder()
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .map_err(|e| http_error(Box::new(e)))?;

    let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
    let response = tokio::time::timeout(CHECK_TIMEOUT, client.request(req))
        .await
        .map_err(|_| http_error("health check timed out after 10s".into()))?
        .map_err(|e| http_error(Box::new(e)))?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| http_error(Box::new(e)))?
        .to_bytes();

    if status.is_success() {
        Ok(body)
    } else {
        Err(TelltaleError::HealthCheckFailed(status))
    }
}

fn summary(url: &str, health: &HealthResponse) -> String {
    let config = &health.config;
    let stats = &health.stats;
    [
        format!("\u{2713} telltale is healthy ({url}, {})", health.commit),
        format!("  uptime:         {}", format_uptime(health.uptime_seconds)),
        format!("  config source:  {}", config.source),
        format!(
            "  config version: {} (loaded {}s ago, {} reloads)",
            config.version, config.loaded_ago_seconds, stats.config_reloads
        ),
        format!(
            "  routes:         {} routes, {} targets",
            config.routes, config.targets
        ),
        format!("  namespace:      {}", config.namespace),
        format!(
            "  requests:       {} forwarded, {} failed, {} retries",
            stats.requests_forwarded, stats.requests_failed, stats.retries
        ),
        format!(
            "  metrics:        {}",
            health.metrics.path.as_deref().unwrap_or("disabled")
        ),
    ]
    .join("\n")
}

fn format_uptime(seconds: u64) -> String {
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    match (hours, minutes) {
        (0, 0) => format!("{secs}s"),
        (0, _) => format!("{minutes}m {secs}s"),
        _ => format!("{hours}h {minutes}m {secs}s"),
    }
}
