// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use codefeed::{
    config::Config,
    query::{MemoryBackend, QueryAdapter},
    repositories::{COMMENTS, POSTS, USERS, schema},
    routes,
    state::AppState,
    utils::jwt::sign_jwt,
};
use serde_json::{Value, json};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub fn test_config() -> Config {
    Config {
        database_url: None,
        db_max_connections: 1,
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
    }
}

/// A fresh in-memory backend with the schema installed, and the state wired
/// on top of it.
pub fn memory_state() -> (MemoryBackend, AppState) {
    let backend = MemoryBackend::new();
    schema::install(&backend);
    let state = AppState::new(QueryAdapter::new(Arc::new(backend.clone())), test_config());
    (backend, state)
}

/// Fixed base time so relative timestamps order deterministically.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn at_minute(minute: i64) -> String {
    (base_time() + Duration::minutes(minute)).to_rfc3339()
}

pub fn seed_user(backend: &MemoryBackend, username: &str) -> i64 {
    let rows = backend.seed(USERS, vec![json!({ "username": username })]);
    rows[0]["id"].as_i64().unwrap()
}

/// Inserts a post directly, `minute` minutes after the base time.
pub fn seed_post(backend: &MemoryBackend, author_id: i64, content: &str, minute: i64) -> i64 {
    seed_post_with(backend, json!({ "author_id": author_id, "content": content, "created_at": at_minute(minute) }))
}

pub fn seed_post_with(backend: &MemoryBackend, row: Value) -> i64 {
    let rows = backend.seed(POSTS, vec![row]);
    rows[0]["id"].as_i64().unwrap()
}

pub fn seed_comment(backend: &MemoryBackend, post_id: i64, author_id: i64, content: &str) -> i64 {
    let rows = backend.seed(
        COMMENTS,
        vec![json!({ "post_id": post_id, "author_id": author_id, "content": content })],
    );
    rows[0]["id"].as_i64().unwrap()
}

pub fn token(user_id: i64) -> String {
    sign_jwt(user_id, JWT_SECRET, 600).unwrap()
}

pub struct TestApp {
    pub address: String,
    pub backend: MemoryBackend,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

/// Helper function to spawn the app on a random port for testing.
pub async fn spawn_app() -> TestApp {
    let (backend, state) = memory_state();
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        backend,
        client: reqwest::Client::new(),
    }
}
