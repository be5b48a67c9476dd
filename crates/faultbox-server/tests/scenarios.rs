//! End-to-end request scenarios.
//!
//! Drives the full router against the in-process transports and a dry-run
//! traffic controller, so no MySQL, Redis or root privileges are required.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use faultbox_config::{CpuFaultConfig, DataConfig, FaultsConfig};
use faultbox_fault::{DryRunTrafficControl, standard_faults};
use faultbox_fault::tc::{clear_args, install_args};
use faultbox_server::{AppState, Sandbox, router};
use faultbox_store::{
    Backend, CacheBackend, CacheClient, MemoryCache, MemoryPrimary, PrimaryBackend,
    PrimaryClient, Store,
};
use serde_json::{Value, json};
use tower::ServiceExt;

struct Harness {
    app: Router,
    sandbox: Arc<Sandbox>,
    primary: Arc<MemoryPrimary>,
    cache: Arc<MemoryCache>,
    tc: Arc<DryRunTrafficControl>,
}

fn faults_config() -> FaultsConfig {
    FaultsConfig {
        cpu: CpuFaultConfig {
            default_duration_ms: 20,
            burn_depth: 10,
        },
        ..FaultsConfig::default()
    }
}

fn harness() -> Harness {
    let primary = Arc::new(MemoryPrimary::new());
    let cache = Arc::new(MemoryCache::new());
    let store = Store::new(
        PrimaryBackend::from_client(Arc::clone(&primary)),
        CacheBackend::from_client(Arc::clone(&cache)),
        DataConfig::default(),
    );
    build(store, primary, cache)
}

fn build(store: Store, primary: Arc<MemoryPrimary>, cache: Arc<MemoryCache>) -> Harness {
    let tc = Arc::new(DryRunTrafficControl::new());
    let faults = standard_faults(&faults_config(), store.cache().clone(), tc.clone()).unwrap();
    let sandbox = Arc::new(Sandbox::new(store, faults));
    let app = router(AppState::new(Arc::clone(&sandbox)), Duration::from_secs(30));
    Harness {
        app,
        sandbox,
        primary,
        cache,
        tc,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn ids(users: &Value) -> Vec<String> {
    users
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["id"].as_str().unwrap().to_string())
        .collect()
}

// ============================================================================
// Data surface
// ============================================================================

#[tokio::test]
async fn empty_stores_are_seeded_then_served_from_cache() {
    let h = harness();

    let (status, first) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first.as_array().unwrap().len(), 10);
    assert_eq!(ids(&first)[0], "db-0001");
    assert_eq!(h.primary.insert_calls(), 10);

    // Ten records plus the id list.
    let sets_after_first = h.cache.set_calls();
    assert_eq!(sets_after_first, 11);

    let (status, second) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&second), ids(&first));
    assert_eq!(h.cache.set_calls(), sets_after_first);
    assert_eq!(h.primary.insert_calls(), 10);
    // Id list plus ten records.
    assert_eq!(h.cache.get_calls(), 1 + 1 + 10);
}

#[tokio::test]
async fn partial_cache_is_fully_repopulated() {
    let h = harness();
    send(&h.app, Method::GET, "/api/users", None).await;
    h.cache.remove("user:cache-0003");
    let sets_before = h.cache.set_calls();

    let (status, _) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.cache.set_calls(), sets_before + 11);
    assert!(h.cache.entry("user:cache-0003").is_some());
}

#[tokio::test]
async fn mock_backends_serve_without_touching_anything() {
    let primary = Arc::new(MemoryPrimary::new());
    let cache = Arc::new(MemoryCache::new());
    let store = Store::new(Backend::Mock, Backend::Mock, DataConfig::default());
    let h = build(store, primary, cache);

    let (status, users) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&users).len(), 10);
    assert!(ids(&users).iter().all(|id| id.starts_with("db-")));
    assert_eq!(h.primary.query_calls(), 0);
    assert_eq!(h.cache.get_calls(), 0);
}

#[tokio::test]
async fn unknown_chaos_still_serves() {
    let h = harness();
    let (status, users) = send(&h.app, Method::GET, "/api/users?chaos=nonexistent", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 10);
    assert!(h.sandbox.faults().list_active().is_empty());
}

#[tokio::test]
async fn invalid_duration_is_rejected() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        Method::GET,
        "/api/users?chaos=latency&duration=soon",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request");
    assert!(h.tc.commands().is_empty());
}

#[tokio::test]
async fn failed_seed_is_a_server_error() {
    let h = harness();
    h.primary.fail_inserts(true);

    let (status, body) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to query users");
    assert!(body["details"].as_str().unwrap().contains("db-0001"));
}

#[tokio::test]
async fn cpu_chaos_burns_then_serves() {
    let h = harness();
    let (status, users) = send(
        &h.app,
        Method::GET,
        "/api/users?chaos=cpu&duration=30",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 10);
    // The burn completes before the data is served.
    assert!(h.sandbox.faults().list_active().is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send(&h.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

// ============================================================================
// Fault control
// ============================================================================

#[tokio::test]
async fn latency_start_status_stop_status() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/faults/latency/start",
        Some(json!({ "duration": 300 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "fault": "latency", "active": true }));

    let (_, status_map) = send(&h.app, Method::GET, "/faults/status", None).await;
    assert_eq!(status_map["latency"]["active"], true);
    assert_eq!(status_map["cpu"]["active"], false);
    assert_eq!(status_map["redis_latency"]["active"], false);
    assert_eq!(
        h.tc.commands(),
        vec![clear_args("eth0"), install_args("eth0", 300)]
    );

    let (_, active) = send(&h.app, Method::GET, "/faults/active", None).await;
    assert_eq!(active, json!(["latency"]));

    let (status, body) = send(&h.app, Method::POST, "/faults/latency/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (_, status_map) = send(&h.app, Method::GET, "/faults/status", None).await;
    assert_eq!(status_map["latency"]["active"], false);
    assert_eq!(h.tc.commands().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn redis_latency_twice_sends_one_command() {
    let h = harness();
    let uri = "/api/users?chaos=redis_latency&duration=150";

    let (status, _) = send(&h.app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        h.cache.control_commands(),
        vec![vec!["FAULT.START".to_string(), "150".to_string()]]
    );
    assert_eq!(h.cache.injected_delay(), Duration::from_millis(150));
}

#[tokio::test(start_paused = true)]
async fn plain_request_clears_active_faults() {
    let h = harness();
    send(&h.app, Method::GET, "/api/users?chaos=redis_latency", None).await;
    send(&h.app, Method::GET, "/api/users?chaos=latency", None).await;
    assert_eq!(h.sandbox.faults().list_active().len(), 2);

    let (status, _) = send(&h.app, Method::GET, "/api/users?chaos=none", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.sandbox.faults().list_active().is_empty());
    assert!(h.cache.injected_delay().is_zero());
}

#[tokio::test]
async fn unknown_fault_is_not_found() {
    let h = harness();
    let (status, body) = send(&h.app, Method::POST, "/faults/nonexistent/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Fault not found");

    let (status, _) = send(&h.app, Method::POST, "/faults/nonexistent/stop", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(h.sandbox.faults().list_active().is_empty());
}

#[tokio::test]
async fn failed_start_is_a_server_error() {
    let h = harness();
    h.tc.fail_install(true);

    let (status, body) = send(&h.app, Method::POST, "/faults/latency/start", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to start fault");

    let (_, status_map) = send(&h.app, Method::GET, "/faults/status", None).await;
    assert_eq!(status_map["latency"]["active"], false);
}

#[tokio::test(start_paused = true)]
async fn stop_all_reports_failures_without_raising() {
    let h = harness();
    send(&h.app, Method::POST, "/faults/latency/start", None).await;
    send(&h.app, Method::POST, "/faults/redis_latency/start", None).await;
    h.tc.fail_clear(true);
    h.cache.fail_control(true);

    let (status, body) = send(&h.app, Method::POST, "/faults/stop-all", None).await;
    assert_eq!(status, StatusCode::OK);
    let failed: Vec<&str> = body["failed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|failure| failure["fault"].as_str().unwrap())
        .collect();
    assert_eq!(failed, vec!["latency", "redis_latency"]);

    // Serving still works with the faults stuck on.
    let (status, _) = send(&h.app, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn shutdown_stops_faults_and_closes_store() {
    let h = harness();
    send(&h.app, Method::POST, "/faults/latency/start", None).await;

    let stuck = h.sandbox.shutdown().await;
    assert!(stuck.is_empty());
    assert!(h.sandbox.faults().list_active().is_empty());
    assert!(!h.primary.is_connected());
    assert!(!h.cache.is_connected());
}
