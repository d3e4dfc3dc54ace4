//! Integration tests for the API server
//!
//! These tests start the server against a live `PostgreSQL` instance and
//! exercise the auth + roadmap + generation flow over real HTTP.
//!
//! Start the database with: `docker-compose up -d postgres`
//!
//! Run with:
//! `cargo test --package coursecraft-api-server --test api_integration_test -- --ignored --nocapture`
//!
//! All tests are marked with #[ignore] to prevent running in CI without a
//! live database.

use std::sync::Arc;
use std::time::Duration;

use coursecraft_api_server::{start_server, ApiState, SessionConfig};
use coursecraft_storage::{MetadataStore, PostgresConfig, PostgresStore};

const BIND_ADDR: &str = "127.0.0.1:18090";

/// Check if `PostgreSQL` is available
async fn is_postgres_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:5432")
        .await
        .is_ok()
}

/// Boot the server in the background and return its base URL
async fn spawn_server() -> Option<String> {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Start with: docker-compose up -d postgres");
        return None;
    }

    let store = Arc::new(
        PostgresStore::connect(&PostgresConfig::default())
            .await
            .expect("failed to connect to PostgreSQL"),
    );
    store.init_schema().await.expect("failed to init schema");

    let state = ApiState::new(store, SessionConfig::default());
    tokio::spawn(async move {
        start_server(BIND_ADDR, state)
            .await
            .expect("failed to start server");
    });

    // Give the server time to bind
    tokio::time::sleep(Duration::from_millis(300)).await;

    Some(format!("http://{BIND_ADDR}"))
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}+{}@example.com", uuid::Uuid::new_v4())
}

/// Pull the session cookie pair out of a login response
fn session_cookie_pair(response: &reqwest::Response) -> String {
    let header = response
        .headers()
        .get("set-cookie")
        .expect("login should set a cookie")
        .to_str()
        .unwrap();
    assert!(header.starts_with("cc_session="));
    header.split(';').next().unwrap().to_string()
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_health_endpoint() {
    let Some(base) = spawn_server().await else {
        return;
    };

    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_auth_and_roadmap_flow() {
    let Some(base) = spawn_server().await else {
        return;
    };
    let client = reqwest::Client::new();
    let email = unique_email("flow");

    // Unauthenticated access is rejected
    let response = client.get(format!("{base}/roadmaps")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    // Register
    let response = client
        .post(format!("{base}/auth/register"))
        .json(&serde_json::json!({"email": email, "password": "hunter2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Duplicate registration conflicts (email normalization included)
    let response = client
        .post(format!("{base}/auth/register"))
        .json(&serde_json::json!({"email": email.to_uppercase(), "password": "other"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // Wrong password is rejected
    let response = client
        .post(format!("{base}/auth/login"))
        .json(&serde_json::json!({"email": email, "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Login
    let response = client
        .post(format!("{base}/auth/login"))
        .json(&serde_json::json!({"email": email, "password": "hunter2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let cookie = session_cookie_pair(&response);

    // Create a roadmap (defaults fill level/hours/duration)
    let response = client
        .post(format!("{base}/roadmaps"))
        .header("Cookie", &cookie)
        .json(&serde_json::json!({"title": "Learn Rust", "field": "systems programming"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let roadmap: serde_json::Value = response.json().await.unwrap();
    assert_eq!(roadmap["level"], "beginner");
    assert_eq!(roadmap["weekly_hours"], 8);
    assert_eq!(roadmap["duration_weeks"], 16);
    let roadmap_id = roadmap["id"].as_str().unwrap().to_string();

    // It shows up in the listing and detail view
    let response = client
        .get(format!("{base}/roadmaps"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let listed: serde_json::Value = response.json().await.unwrap();
    assert!(listed
        .as_array()
        .unwrap()
        .iter()
        .any(|r| r["id"] == roadmap_id.as_str()));

    let response = client
        .get(format!("{base}/roadmaps/{roadmap_id}"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Queue outline generation: accepted with a pollable run
    let response = client
        .post(format!("{base}/roadmaps/{roadmap_id}/generate"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    let accepted: serde_json::Value = response.json().await.unwrap();
    assert_eq!(accepted["status"], "queued");
    let run_id = accepted["run_id"].as_str().unwrap().to_string();

    let response = client
        .get(format!("{base}/runs/{run_id}"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let run: serde_json::Value = response.json().await.unwrap();
    // No worker is running in this test; the run stays queued
    assert_eq!(run["status"], "queued");
    assert!(run["result"].is_null());

    // Unknown resources are 404s
    let missing = uuid::Uuid::new_v4();
    let response = client
        .get(format!("{base}/runs/{missing}"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Logout clears the session server-side
    let response = client
        .post(format!("{base}/auth/logout"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .get(format!("{base}/roadmaps"))
        .header("Cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
