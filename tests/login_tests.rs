mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_register_creates_account_and_session() {
    let (app, db) = test_app().await;

    let (body, _cookie) = register_user(&app, "alice@example.com", "password123", "Alice").await;

    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert!(body["expires_in"].as_u64().unwrap() > 0);
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert_eq!(body["user"]["display_name"], "Alice");
    assert_eq!(body["user"]["role"], "player");

    let user = db
        .users()
        .get_by_email("alice@example.com")
        .await
        .unwrap()
        .expect("User not persisted");
    assert_ne!(user.password_hash, "password123");
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let (app, _db) = test_app().await;

    let cases = [
        json!({"email": "not-an-email", "password": "password123", "display_name": "A"}),
        json!({"email": "a@example.com", "password": "short", "display_name": "A"}),
        json!({"email": "a@example.com", "password": "password123", "display_name": ""}),
        json!({"email": "", "password": "password123", "display_name": "A"}),
    ];

    for case in cases {
        let response = post_json(&app, "/api/auth/register", case.clone()).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "expected 400 for {}",
            case
        );
    }
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let (app, _db) = test_app().await;
    register_user(&app, "alice@example.com", "password123", "Alice").await;

    let response = post_json(
        &app,
        "/api/auth/register",
        json!({"email": "alice@example.com", "password": "password456", "display_name": "Alice2"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Email comparison is case-insensitive.
    let response = post_json(
        &app,
        "/api/auth/register",
        json!({"email": "ALICE@example.com", "password": "password456", "display_name": "Alice2"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_returns_tokens() {
    let (app, _db) = test_app().await;
    register_user(&app, "alice@example.com", "password123", "Alice").await;

    let (body, cookie) = login_user(&app, "alice@example.com", "password123", false).await;

    assert!(!body["access_token"].as_str().unwrap().is_empty());
    assert_eq!(body["user"]["email"], "alice@example.com");
    assert!(cookie.starts_with("courtside_refresh="));
}

#[tokio::test]
async fn test_login_failures_share_one_error_message() {
    let (app, _db) = test_app().await;
    register_user(&app, "alice@example.com", "password123", "Alice").await;

    let wrong_password = post_json(
        &app,
        "/api/auth/login",
        json!({"email": "alice@example.com", "password": "wrongwrong"}),
    )
    .await;
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    let wrong_password = body_json(wrong_password).await;

    let unknown_email = post_json(
        &app,
        "/api/auth/login",
        json!({"email": "nobody@example.com", "password": "password123"}),
    )
    .await;
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let unknown_email = body_json(unknown_email).await;

    // An attacker must not be able to tell which part was wrong.
    assert_eq!(wrong_password["error"], unknown_email["error"]);
}

#[tokio::test]
async fn test_refresh_cookie_attributes() {
    let (app, _db) = test_app().await;
    register_user(&app, "alice@example.com", "password123", "Alice").await;

    let response = post_json(
        &app,
        "/api/auth/login",
        json!({"email": "alice@example.com", "password": "password123", "remember": false}),
    )
    .await;
    let set_cookie = refresh_set_cookie(&response).unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/api/auth"));
    // Session cookie: no Max-Age unless the user asked to be remembered.
    assert!(!set_cookie.contains("Max-Age"));

    let response = post_json(
        &app,
        "/api/auth/login",
        json!({"email": "alice@example.com", "password": "password123", "remember": true}),
    )
    .await;
    let set_cookie = refresh_set_cookie(&response).unwrap();
    assert!(set_cookie.contains("Max-Age"));
}

#[tokio::test]
async fn test_me_requires_valid_bearer_token() {
    let (app, _db) = test_app().await;
    let (body, _cookie) = register_user(&app, "alice@example.com", "password123", "Alice").await;
    let token = body["access_token"].as_str().unwrap();

    let response = get_with_bearer(&app, "/api/auth/me", token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["uuid"], body["user"]["uuid"]);

    let response = get_with_bearer(&app, "/api/auth/me", "garbage.token.here").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = axum::http::Request::builder()
        .method("GET")
        .uri("/api/auth/me")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_carries_identity_claims() {
    let (app, _db) = test_app().await;
    let (body, _cookie) = register_user(&app, "alice@example.com", "password123", "Alice").await;

    // Validate the issued token with an independently constructed config.
    let jwt = courtside_auth::jwt::JwtConfig::new(
        TEST_JWT_SECRET,
        courtside_auth::jwt::TokenLifetimes::default(),
    );
    let claims = jwt
        .validate_access_token(body["access_token"].as_str().unwrap())
        .expect("Token should validate");
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.sub, body["user"]["uuid"].as_str().unwrap());
}
