//! End-to-end tests for the HTTP surface: a real listener on an ephemeral
//! port, providers and dependencies served by wiremock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use async_trait::async_trait;
use fanout::{FanoutServer, ServerConfig, ServiceConfig};
use fanout_retrieval::readiness::DependencyProbe;
use fanout_retrieval::{Orchestrator, ReadinessReporter, RetrievalError};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// One keyless JSON lane pointed at `upstream`, plus the given readiness
/// dependencies (raw TOML).
fn service_config(upstream: &str, dependencies: &str) -> ServiceConfig {
    let toml = format!(
        r#"
[server]
bind = "127.0.0.1:0"
environment = "test"
build_sha = "deadbeef"

[retrieval]
cache_ttl_seconds = 0

[[retrieval.lanes]]
name = "knowledge_graph"
weight_ms = 1000

[[retrieval.lanes.keyless]]
id = "wiki"
timeout_ms = 800

[retrieval.lanes.keyless.endpoint]
type = "json_api"
url = "{upstream}/search"
results_pointer = "/pages"
content_field = "excerpt"
url_field = "url"

[readiness]
probe_timeout_ms = 500
{dependencies}
"#
    );
    let config: ServiceConfig = toml::from_str(&toml).expect("fixture config parses");
    config.validate().expect("fixture config is valid");
    config
}

async fn upstream_with_pages() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust ownership"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pages": [
                {
                    "title": "Ownership",
                    "excerpt": "Each value in Rust has an owner.",
                    "url": "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html"
                },
                {
                    "title": "Borrowing",
                    "excerpt": "References allow you to refer to a value without owning it.",
                    "url": "https://doc.rust-lang.org/book/ch04-02-references-and-borrowing.html"
                }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    server
}

fn url(server: &FanoutServer, route: &str) -> String {
    format!("http://{}{route}", server.addr())
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

struct StaticProbe {
    name: &'static str,
    required: bool,
    up: bool,
}

#[async_trait]
impl DependencyProbe for StaticProbe {
    fn name(&self) -> &str {
        self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn check(&self) -> Result<(), RetrievalError> {
        if self.up {
            Ok(())
        } else {
            Err(RetrievalError::Http(format!("{} unreachable", self.name)))
        }
    }
}

// ---------------------------------------------------------------------------
// Liveness and metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok_with_build_sha() {
    let upstream = upstream_with_pages().await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();

    let resp = client().get(url(&server, "/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["build_sha"], "deadbeef");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime_s"].is_u64());

    server.shutdown().await;
}

#[tokio::test]
async fn version_reports_environment() {
    let upstream = upstream_with_pages().await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();

    let body: Value = client()
        .get(url(&server, "/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["environment"], "test");
    assert_eq!(body["build_sha"], "deadbeef");
    assert!(body["timestamp"].is_string());

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ready_with_only_optional_dependency_down() {
    let upstream = upstream_with_pages().await;
    let deps = format!(
        r#"
[[readiness.dependencies]]
name = "vector_store"
type = "http"
url = "{0}/healthz"

[[readiness.dependencies]]
name = "analytics"
required = false
type = "http"
url = "{0}/down"
"#,
        upstream.uri()
    );
    let server = FanoutServer::start(&service_config(&upstream.uri(), &deps))
        .await
        .unwrap();

    let resp = client().get(url(&server, "/ready")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["error_count"], 1);
    let deps = body["dependencies"].as_array().unwrap();
    assert_eq!(deps.len(), 2);
    let analytics = deps.iter().find(|d| d["name"] == "analytics").unwrap();
    assert_eq!(analytics["status"], "down");
    assert_eq!(analytics["required"], false);

    server.shutdown().await;
}

#[tokio::test]
async fn not_ready_when_required_dependency_down() {
    let upstream = upstream_with_pages().await;
    let deps = format!(
        r#"
[[readiness.dependencies]]
name = "vector_store"
type = "http"
url = "{}/down"
"#,
        upstream.uri()
    );
    let server = FanoutServer::start(&service_config(&upstream.uri(), &deps))
        .await
        .unwrap();

    let resp = client().get(url(&server, "/ready")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["dependencies"][0]["status"], "down");
    assert!(body["dependencies"][0]["error_message"].is_string());

    server.shutdown().await;
}

#[tokio::test]
async fn custom_probes_drive_readiness() {
    let upstream = upstream_with_pages().await;
    let config = service_config(&upstream.uri(), "");
    let orchestrator = Orchestrator::from_config(config.retrieval.clone()).unwrap();
    let readiness = ReadinessReporter::new(
        vec![
            Box::new(StaticProbe {
                name: "cache",
                required: true,
                up: true,
            }),
            Box::new(StaticProbe {
                name: "market_feed",
                required: true,
                up: false,
            }),
        ],
        Duration::from_millis(200),
    );
    let server = FanoutServer::start_with(
        orchestrator,
        readiness,
        ServerConfig {
            bind: "127.0.0.1:0".into(),
            ..ServerConfig::default()
        },
    )
    .await
    .unwrap();

    let resp = client().get(url(&server, "/ready")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error_count"], 1);

    server.shutdown().await;
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retrieve_returns_ranked_documents() {
    let upstream = upstream_with_pages().await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();

    let resp = client()
        .post(url(&server, "/retrieve"))
        .json(&json!({ "text": "rust ownership", "mode": "simple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    let docs = body["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["title"], "Ownership");
    assert_eq!(docs[0]["source_provider"], "wiki");
    assert_eq!(docs[0]["lanes"], json!(["knowledge_graph"]));
    assert!(
        docs[0]["relevance_score"].as_f64().unwrap()
            >= docs[1]["relevance_score"].as_f64().unwrap()
    );
    assert_eq!(body["degraded"], false);
    assert_eq!(body["lane_metrics"]["knowledge_graph"]["status"], "ok");
    assert!(!body["trace_id"].as_str().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn retrieve_with_blank_text_is_bad_request() {
    let upstream = upstream_with_pages().await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();

    let resp = client()
        .post(url(&server, "/retrieve"))
        .json(&json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_query");

    server.shutdown().await;
}

#[tokio::test]
async fn failing_upstream_gives_degraded_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();

    let resp = client()
        .post(url(&server, "/retrieve"))
        .json(&json!({ "text": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["degraded"], true);
    assert!(body["documents"].as_array().unwrap().is_empty());
    assert_eq!(body["lane_metrics"]["knowledge_graph"]["status"], "empty");

    server.shutdown().await;
}

#[tokio::test]
async fn provider_health_lists_every_provider() {
    let upstream = upstream_with_pages().await;
    let server = FanoutServer::start(&service_config(&upstream.uri(), ""))
        .await
        .unwrap();
    let http = client();

    http.post(url(&server, "/retrieve"))
        .json(&json!({ "text": "rust ownership" }))
        .send()
        .await
        .unwrap();

    let resp = http
        .get(url(&server, "/health/providers"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let providers = body.as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["lane"], "knowledge_graph");
    assert_eq!(providers[0]["provider_id"], "wiki");
    assert_eq!(providers[0]["status"], "healthy");
    assert_eq!(providers[0]["total_successes"], 1);

    server.shutdown().await;
}
