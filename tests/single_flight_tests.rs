mod common;

use common::*;
use courtside_auth::client::{ApiClient, ME_PATH, SessionHandle, SessionStatus};
use courtside_auth::jwt::TokenLifetimes;
use std::time::Duration;

async fn register_and_login(server: &TestServer) -> SessionHandle {
    let client = reqwest::Client::new();
    let response = client
        .post(server.base_url.join("/api/auth/register").unwrap())
        .json(&serde_json::json!({
            "email": "alice@example.com",
            "password": "password123",
            "display_name": "Alice",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let session = SessionHandle::new(server.base_url.clone()).unwrap();
    session
        .login("alice@example.com", "password123", false)
        .await
        .unwrap();
    session
}

async fn token_counts(server: &TestServer) -> (i64, i64) {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(server.db.pool())
        .await
        .unwrap();
    let revoked = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refresh_tokens WHERE revoked_at IS NOT NULL",
    )
    .fetch_one(server.db.pool())
    .await
    .unwrap();
    (total, revoked)
}

/// Five concurrent callers ask for a refresh at once. They must share one
/// in-flight round-trip: the store sees exactly one rotation, not five.
#[tokio::test]
async fn test_concurrent_refreshes_share_one_round_trip() {
    let server = spawn_server(TokenLifetimes::default()).await;
    let session = register_and_login(&server).await;

    // Register issued one token and login a second; nothing rotated yet.
    assert_eq!(token_counts(&server).await, (2, 0));

    let (a, b, c, d, e) = tokio::join!(
        session.refresh(),
        session.refresh(),
        session.refresh(),
        session.refresh(),
        session.refresh(),
    );
    for result in [a, b, c, d, e] {
        result.expect("Joined refresh failed");
    }

    // One rotation: one new record, one revocation.
    assert_eq!(token_counts(&server).await, (3, 1));
    assert_eq!(session.snapshot().status, SessionStatus::Authenticated);
}

/// Requests that hit the server with an expired access token recover by
/// refreshing once and retrying, invisibly to the caller.
#[tokio::test]
async fn test_expired_token_requests_recover_via_refresh() {
    let server = spawn_server(TokenLifetimes {
        access_secs: 1,
        refresh_secs: 3600,
    })
    .await;
    let session = register_and_login(&server).await;

    // Let the access token expire. Validation applies no leeway but exp
    // has whole-second resolution, so wait past the next boundary.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let api = ApiClient::new(session.clone());
    let mut tasks = Vec::new();
    for _ in 0..5 {
        let api = api.clone();
        tasks.push(tokio::spawn(async move { api.get(ME_PATH).await }));
    }

    for task in tasks {
        let response = task.await.unwrap().expect("Request failed after refresh");
        let me: serde_json::Value = response.json().await.unwrap();
        assert_eq!(me["email"], "alice@example.com");
    }

    assert_eq!(session.snapshot().status, SessionStatus::Authenticated);
    assert!(session.access_token().is_some());
}

/// A logout issued while a refresh is in flight must leave the session
/// anonymous; a stale refresh result must not revive it.
#[tokio::test]
async fn test_logout_wins_over_in_flight_refresh() {
    let server = spawn_server(TokenLifetimes::default()).await;
    let session = register_and_login(&server).await;

    let refresher = {
        let session = session.clone();
        tokio::spawn(async move { session.refresh().await })
    };
    session.logout().await;
    let _ = refresher.await.unwrap();

    // Whatever order the two resolved in, logout is final.
    assert_eq!(session.snapshot().status, SessionStatus::Anonymous);
    assert!(session.access_token().is_none());
    assert!(session.current_user().is_none());
}
