#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tprunner::executor::{Executor, ProgramConfig, StderrPolicy};
use tprunner::http_server;
use tprunner::log_store::LogStore;
use tprunner::rate_limit::RateLimiter;
use tprunner::state::AppState;

pub const TEST_IP: &str = "203.0.113.10";
pub const TEST_USER_AGENT: &str = "integration-test/1.0";

/// `sh -c <script>`; the debug flag arrives as `$1`.
pub fn sh_program(script: &str) -> ProgramConfig {
    ProgramConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        timeout: Duration::from_secs(10),
        stderr_policy: StderrPolicy::AnyOutput,
    }
}

/// A program that leaves `marker` behind if it is ever started.
pub fn spy_program(marker: &Path) -> ProgramConfig {
    sh_program(&format!("touch '{}'; cat", marker.display()))
}

pub async fn memory_logs() -> LogStore {
    let logs = LogStore::connect("sqlite::memory:", 1).await.unwrap();
    logs.migrate().await.unwrap();
    logs
}

pub async fn test_state(program: ProgramConfig) -> AppState {
    AppState::new(
        Executor::new(program),
        RateLimiter::in_memory(),
        memory_logs().await,
    )
}

pub fn build_test_app(state: AppState) -> Router {
    http_server::router(state)
}

/// Minimal `application/x-www-form-urlencoded` encoding.
pub fn form_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

pub fn post_request(uri: &str, text: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(USER_AGENT, TEST_USER_AGENT)
        .header("x-forwarded-for", ip)
        .body(Body::from(format!("text={}", form_encode(text))))
        .unwrap()
}

pub fn get_request(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn post_text(app: Router, text: &str) -> Response<Body> {
    send(app, post_request("/", text, TEST_IP)).await
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
