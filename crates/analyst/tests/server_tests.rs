//! Integration tests for the HTTP surface: a real server on a random port
//! with a scripted provider behind the analyzer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use analyst_agent::Analyzer;
use analyst_guac::GuacClient;
use analyst_provider::{AnalyzeOptions, LlmResponse, Provider};
use guac_analyst::server::build_router;

struct ScriptedProvider {
    responses: Mutex<VecDeque<LlmResponse>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn analyze(
        &self,
        _system_messages: &[String],
        _user_messages: &[String],
        _options: AnalyzeOptions,
    ) -> analyst_provider::Result<LlmResponse> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted"))
    }
}

/// Spawn the app on port 0 with a closed-port GUAC backend (the scripted
/// scenarios here never reach it successfully).
async fn spawn_app(responses: Vec<LlmResponse>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = listener.local_addr().unwrap();
    drop(listener);

    let guac_client = GuacClient::new(
        format!("http://{backend_addr}/query"),
        Duration::from_millis(500),
    )
    .unwrap();
    let analyzer = Arc::new(Analyzer::new(guac_client, ScriptedProvider::new(responses)));
    let app = build_router(analyzer);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_health() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::get(format!("{base}/api/v1/health")).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_health_wrong_method() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn test_analyze_wrong_method() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::get(format!("{base}/api/v1/analyze")).await.unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn test_analyze_malformed_json() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert!(resp.text().await.unwrap().starts_with("Invalid request:"));
}

#[tokio::test]
async fn test_analyze_empty_query() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .json(&json!({"query": ""}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_analyze_temperature_out_of_range() {
    let base = spawn_app(vec![]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .json(&json!({"query": "hi", "options": {"temperature": 3.5}}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_analyze_happy_path() {
    let base = spawn_app(vec![LlmResponse::text("hello")]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .json(&json!({"query": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "hello");
    assert_eq!(body["metadata"]["steps"], 0);
    assert_eq!(body["supportingData"]["queries"], json!([]));
}

#[tokio::test]
async fn test_backend_outage_still_answers_200() {
    // The tool call hits the closed backend port twice, then the loop asks
    // the provider for the apology.
    let base = spawn_app(vec![
        LlmResponse::call("Packages", "{\"name\":\"foo\"}"),
        LlmResponse::text("Sorry, GUAC is unreachable right now. Please try again later."),
    ])
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .json(&json!({"query": "find foo"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["result"].as_str().unwrap().contains("unreachable"));
    assert_eq!(body["metadata"]["steps"], 1);
    assert_eq!(
        body["supportingData"]["guacData"][0]["data"],
        "Failed to reach GUAC after multiple attempts."
    );
}

#[tokio::test]
async fn test_provider_failure_is_500() {
    // Script exhausted means the provider panics, so instead simulate an
    // LLM-produced non-JSON argument payload, which must surface as 500.
    let base = spawn_app(vec![LlmResponse::call("Packages", "not json")]).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/v1/analyze"))
        .json(&json!({"query": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 500);
}
