#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use courtside_auth::jwt::TokenLifetimes;
use courtside_auth::{ServerConfig, create_app, db::Database, run_server};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

/// Signing secret for tests, long enough to pass startup validation.
pub const TEST_JWT_SECRET: &[u8] = b"test-secret-0123456789-0123456789-0123456789";

pub async fn memory_db() -> Database {
    Database::open(":memory:").await.expect("Failed to open db")
}

pub fn test_config(db: Database, lifetimes: TokenLifetimes) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: TEST_JWT_SECRET.to_vec(),
        lifetimes,
        secure_cookies: false,
        // Rate limiting would trip tests that hammer /login on purpose.
        rate_limit: false,
    }
}

/// Build an in-process app and its database for `oneshot` tests.
pub async fn test_app() -> (Router, Database) {
    test_app_with_lifetimes(TokenLifetimes::default()).await
}

pub async fn test_app_with_lifetimes(lifetimes: TokenLifetimes) -> (Router, Database) {
    let db = memory_db().await;
    let app = create_app(&test_config(db.clone(), lifetimes));
    (app, db)
}

/// A real server on a random port, for client tests that need cookie jars
/// and concurrent connections.
pub struct TestServer {
    pub addr: SocketAddr,
    pub base_url: Url,
    pub db: Database,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server(lifetimes: TokenLifetimes) -> TestServer {
    let db = memory_db().await;
    let config = test_config(db.clone(), lifetimes);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    let base_url = Url::parse(&format!("http://{}", addr)).expect("Failed to parse base URL");

    TestServer {
        addr,
        base_url,
        db,
        handle,
    }
}

pub async fn post_json(app: &Router, path: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request");
    app.clone().oneshot(request).await.expect("Request failed")
}

pub async fn post_with_cookie(app: &Router, path: &str, cookie: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("Failed to build request");
    app.clone().oneshot(request).await.expect("Request failed")
}

pub async fn get_with_bearer(app: &Router, path: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("Failed to build request");
    app.clone().oneshot(request).await.expect("Request failed")
}

pub async fn delete_with_bearer(app: &Router, path: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("Failed to build request");
    app.clone().oneshot(request).await.expect("Request failed")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Extract the refresh cookie (name=value) from a response, if set with a
/// non-empty value.
pub fn refresh_cookie(response: &Response<Body>) -> Option<String> {
    for value in response.headers().get_all(header::SET_COOKIE) {
        let value = value.to_str().ok()?;
        if let Some(pair) = value.split(';').next()
            && pair.starts_with("courtside_refresh=")
            && !pair.ends_with('=')
        {
            return Some(pair.to_string());
        }
    }
    None
}

/// The full Set-Cookie header for the refresh cookie, attributes included.
pub fn refresh_set_cookie(response: &Response<Body>) -> Option<String> {
    for value in response.headers().get_all(header::SET_COOKIE) {
        let value = value.to_str().ok()?;
        if value.starts_with("courtside_refresh=") {
            return Some(value.to_string());
        }
    }
    None
}

/// Register a user and return the parsed session body plus refresh cookie.
pub async fn register_user(
    app: &Router,
    email: &str,
    password: &str,
    display_name: &str,
) -> (Value, String) {
    let response = post_json(
        app,
        "/api/auth/register",
        json!({
            "email": email,
            "password": password,
            "display_name": display_name,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = refresh_cookie(&response).expect("Register did not set refresh cookie");
    (body_json(response).await, cookie)
}

/// Log in and return the parsed session body plus refresh cookie.
pub async fn login_user(app: &Router, email: &str, password: &str, remember: bool) -> (Value, String) {
    let response = post_json(
        app,
        "/api/auth/login",
        json!({
            "email": email,
            "password": password,
            "remember": remember,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = refresh_cookie(&response).expect("Login did not set refresh cookie");
    (body_json(response).await, cookie)
}
