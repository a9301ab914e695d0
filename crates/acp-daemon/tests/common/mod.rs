#![allow(dead_code)]
//! Shared driving helpers for daemon scenario tests.
//!
//! Tests spin up the Axum router **without** binding a TCP socket: each test
//! builds the real `AppState` against the migrated test database and drives
//! the router via `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use acp_daemon::{routes, state::AppState};

pub async fn make_state() -> anyhow::Result<Arc<AppState>> {
    let pool = acp_testkit::db_pool().await?;
    let config = acp_config::RuntimeConfig::from_env()?;
    Ok(Arc::new(AppState::new(pool, config)))
}

pub fn make_router(state: Arc<AppState>) -> axum::Router {
    routes::build_router(state)
}

/// Drive one request; returns (status, parsed JSON body).
pub async fn call_json(
    router: &axum::Router,
    method: &str,
    uri: &str,
    workspace_id: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-workspace-id", workspace_id);

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request build failed");

    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("oneshot failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

/// POST with a JSON body and assert 200, returning the body.
pub async fn post_ok(
    router: &axum::Router,
    uri: &str,
    workspace_id: &str,
    body: Value,
) -> Value {
    let (status, json) = call_json(router, "POST", uri, workspace_id, Some(body)).await;
    assert_eq!(status, StatusCode::OK, "POST {uri} failed: {json}");
    json
}
