//! Shared helpers for router tests. The pool connects lazily, so requests
//! that fail validation never need a running database.

use axum::{http::StatusCode, response::Response};
use http_body_util::BodyExt;
use std::sync::Arc;

use crate::config::Config;
use crate::AppState;

pub fn test_state() -> Arc<AppState> {
    let mut config = Config::default();
    config.database.min_connections = 0;
    config.database.acquire_timeout_seconds = 1;
    config.auth.jwt_secret = "router-test-secret-with-at-least-32-bytes".to_string();

    let db = crate::db::connect_lazy(&config.database).expect("lazy pool");
    Arc::new(AppState::new(config, db))
}

pub async fn body_json(response: Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}
