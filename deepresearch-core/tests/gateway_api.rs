//! Integration tests for the gateway's REST and SSE endpoints.

use axum::body::Body;
use axum::http::StatusCode;
use deepresearch_core::brain::{Brain, MockLlmProvider};
use deepresearch_core::config::{ControllerConfig, RetryConfig};
use deepresearch_core::gateway::{GatewayConfig, GatewayServer, SharedGateway, gateway_router, shared_gateway};
use deepresearch_core::research::{Researcher, StaticPageReader, StaticSearchProvider, TaskRecord};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const QUERY: &str = "Who designed the Rust programming language?";

struct TestGateway {
    gw: SharedGateway,
    llm: Arc<MockLlmProvider>,
    dir: TempDir,
}

fn make_gateway_with(
    config: GatewayConfig,
    controller: ControllerConfig,
    llm: MockLlmProvider,
) -> TestGateway {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(llm);
    let brain = Arc::new(Brain::new(llm.clone(), RetryConfig::none()));
    let researcher = Researcher::new(
        brain,
        Arc::new(StaticSearchProvider::new()),
        Arc::new(StaticPageReader::new()),
    )
    .with_controller_config(controller)
    .with_retry(RetryConfig::none());
    let config = GatewayConfig {
        data_dir: Some(dir.path().to_path_buf()),
        ..config
    };
    TestGateway {
        gw: shared_gateway(GatewayServer::new(config, researcher)),
        llm,
        dir,
    }
}

fn quiet_controller() -> ControllerConfig {
    ControllerConfig {
        rewrite_queries: false,
        semantic_dedup: false,
        analyze_errors: false,
        ..ControllerConfig::default()
    }
}

fn make_gateway() -> TestGateway {
    make_gateway_with(GatewayConfig::default(), quiet_controller(), MockLlmProvider::new())
}

/// A gateway whose runs do not finish on their own: every step searches
/// and then sleeps for a minute.
fn make_slow_gateway(config: GatewayConfig) -> TestGateway {
    let search = json!({"action": "search", "think": "look", "searchQuery": "rust"});
    make_gateway_with(
        config,
        ControllerConfig {
            step_delay_ms: 60_000,
            ..quiet_controller()
        },
        MockLlmProvider::new().with_fallback(search.to_string()),
    )
}

fn queue_accepted_answer(llm: &MockLlmProvider) {
    llm.queue_json(json!({
        "action": "answer",
        "think": "Known fact.",
        "answer": "Graydon Hoare.",
        "references": [{"exactQuote": "Graydon Hoare", "url": "https://rust-lang.org/"}],
    }));
    llm.queue_json(json!({"is_definitive": true, "reasoning": "direct"}));
}

fn get(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(gw: &SharedGateway, req: axum::http::Request<Body>) -> (StatusCode, String) {
    let app = gateway_router(gw.clone());
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

async fn send_json(gw: &SharedGateway, req: axum::http::Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(gw, req).await;
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&body).unwrap()
    };
    (status, json)
}

async fn submit(gw: &SharedGateway, body: serde_json::Value) -> Uuid {
    let (status, json) = send_json(gw, post_json("/api/v1/query", body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    json["requestId"].as_str().unwrap().parse().unwrap()
}

async fn wait_for_status(gw: &SharedGateway, id: Uuid, expected: &str) -> serde_json::Value {
    for _ in 0..200 {
        let (status, json) = send_json(gw, get(&format!("/api/v1/task/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        if json["status"] == expected {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached status {expected}");
}

async fn wait_for_steps(gw: &SharedGateway, id: Uuid) {
    for _ in 0..200 {
        let (_, json) = send_json(gw, get(&format!("/api/v1/task/{id}"))).await;
        if json["events"].as_array().is_some_and(|e| !e.is_empty()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never emitted a step");
}

#[tokio::test]
async fn test_health() {
    let t = make_gateway();
    let (status, json) = send_json(&t.gw, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["running"], 0);
}

#[tokio::test]
async fn test_submit_empty_query_is_bad_request() {
    let t = make_gateway();
    let (status, json) = send_json(&t.gw, post_json("/api/v1/query", json!({"q": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Query (q) is required");
}

#[tokio::test]
async fn test_submit_malformed_body_is_bad_request() {
    let t = make_gateway();
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send_json(&t.gw, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_submit_rejects_zero_limits() {
    let t = make_gateway();
    let (status, json) = send_json(&t.gw, post_json("/api/v1/query", json!({"q": QUERY, "budget": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "budget must be at least 1");

    let (status, json) =
        send_json(&t.gw, post_json("/api/v1/query", json!({"q": QUERY, "maxBadAttempt": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "maxBadAttempt must be at least 1");

    assert!(t.llm.requests().is_empty());
    let (_, health) = send_json(&t.gw, get("/health")).await;
    assert_eq!(health["total"], 0);
}

#[tokio::test]
async fn test_query_runs_to_completion_and_is_persisted() {
    let t = make_gateway();
    queue_accepted_answer(&t.llm);

    let id = submit(&t.gw, json!({"q": QUERY, "budget": 10_000, "maxBadAttempt": 2})).await;
    let record = wait_for_status(&t.gw, id, "completed").await;

    assert_eq!(record["query"], QUERY);
    assert_eq!(record["budget"], 10_000);
    assert_eq!(record["max_bad_attempts"], 2);
    assert_eq!(record["final_answer"]["answer"], "Graydon Hoare.");
    assert_eq!(record["final_answer"]["status"], "answered");
    let events = record["events"].as_array().unwrap();
    assert_eq!(events.last().unwrap()["type"], "answer");

    // The background task saves right after updating the registry.
    let mut saved = None;
    for _ in 0..200 {
        saved = TaskRecord::load(t.dir.path(), &id).unwrap();
        if saved.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let saved = saved.expect("task record was not persisted");
    assert_eq!(saved.request_id, id);
    assert!(saved.final_answer.is_some());
}

#[tokio::test]
async fn test_stream_replays_finished_run() {
    let t = make_gateway();
    queue_accepted_answer(&t.llm);
    let id = submit(&t.gw, json!({"q": QUERY})).await;
    wait_for_status(&t.gw, id, "completed").await;

    let app = gateway_router(t.gw.clone());
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, get(&format!("/api/v1/stream/{id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
        .await
        .unwrap();
    let text = String::from_utf8_lossy(&body);
    let connected = text.find("event: connected").unwrap();
    let progress = text.find("event: progress").unwrap();
    let answer = text.find("event: answer").unwrap();
    assert!(connected < progress && progress < answer);
    assert!(text.contains(&id.to_string()));
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let t = make_gateway();
    let id = Uuid::new_v4();
    let (status, _) = send(&t.gw, get(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.gw, get(&format!("/api/v1/stream/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&t.gw, delete(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_task_falls_back_to_disk() {
    let t = make_gateway();
    let record = TaskRecord::new(Uuid::new_v4(), "Saved earlier", 100, 3);
    record.save(t.dir.path()).unwrap();

    let (status, json) = send_json(&t.gw, get(&format!("/api/v1/task/{}", record.request_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["query"], "Saved earlier");
}

#[tokio::test]
async fn test_finished_tasks_are_evicted_and_served_from_disk() {
    let t = make_gateway_with(
        GatewayConfig {
            retain_finished_tasks: 0,
            ..GatewayConfig::default()
        },
        quiet_controller(),
        MockLlmProvider::new(),
    );
    queue_accepted_answer(&t.llm);
    let id = submit(&t.gw, json!({"q": QUERY})).await;

    let mut evicted = false;
    for _ in 0..200 {
        if t.gw.lock().await.registry().is_empty() {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(evicted, "finished task stayed in memory");

    let record = wait_for_status(&t.gw, id, "completed").await;
    assert_eq!(record["final_answer"]["answer"], "Graydon Hoare.");
    let (status, _) = send(&t.gw, delete(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, health) = send_json(&t.gw, get("/health")).await;
    assert_eq!(health["total"], 1);
    assert_eq!(health["running"], 0);
}

#[tokio::test]
async fn test_delete_cancels_running_task() {
    let t = make_slow_gateway(GatewayConfig::default());
    let id = submit(&t.gw, json!({"q": QUERY})).await;
    wait_for_steps(&t.gw, id).await;

    let (status, _) = send(&t.gw, delete(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let record = wait_for_status(&t.gw, id, "cancelled").await;
    let events = record["events"].as_array().unwrap();
    assert_eq!(events.last().unwrap()["type"], "error");

    let (status, _) = send(&t.gw, delete(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_running_task_limit() {
    let t = make_slow_gateway(GatewayConfig {
        max_running_tasks: 1,
        ..GatewayConfig::default()
    });
    let id = submit(&t.gw, json!({"q": QUERY})).await;

    let (status, json) = send_json(&t.gw, post_json("/api/v1/query", json!({"q": "Another question"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(json["error"].as_str().unwrap().contains("limit 1"));

    let (status, _) = send(&t.gw, delete(&format!("/api/v1/task/{id}"))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_bearer_auth_required_when_configured() {
    let t = make_gateway_with(
        GatewayConfig {
            auth_tokens: vec!["secret".into()],
            ..GatewayConfig::default()
        },
        quiet_controller(),
        MockLlmProvider::new(),
    );

    let (status, _) = send(&t.gw, post_json("/api/v1/query", json!({"q": QUERY}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let malformed = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&t.gw, malformed).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.gw, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    queue_accepted_answer(&t.llm);
    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/query")
        .header("content-type", "application/json")
        .header("authorization", "Bearer secret")
        .body(Body::from(json!({"q": QUERY}).to_string()))
        .unwrap();
    let (status, json) = send_json(&t.gw, req).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(json["requestId"].is_string());
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let t = make_gateway();
    let req = axum::http::Request::builder()
        .uri("/health")
        .header("origin", "https://example.org")
        .body(Body::empty())
        .unwrap();
    let app = gateway_router(t.gw.clone());
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
}
