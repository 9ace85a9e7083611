//! Session authentication endpoints.
//!
//! - POST `/register` - Create an account and start a session
//! - POST `/login` - Exchange credentials for an access token + refresh cookie
//! - POST `/refresh` - Rotate the refresh cookie, mint a new access token
//! - POST `/logout` - Revoke the presented refresh token and clear the cookie
//! - GET `/me` - Current user identity (bearer-gated)
//! - GET `/sessions` - List the caller's active refresh sessions
//! - DELETE `/{id}` under `/sessions` - Revoke one session (own, or any as admin)

use axum::{
    Json, Router, middleware,
    extract::{Path, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    Authed, HasAuthState, REFRESH_COOKIE_NAME, clear_refresh_cookie, get_cookie, refresh_cookie,
};
use crate::db::{Database, NewRefreshToken};
use crate::identity::{UserIdentity, UserRole};
use crate::jwt::{JwtConfig, hash_refresh_secret, unix_now};
use crate::password::{self, MIN_PASSWORD_LENGTH};
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub secure_cookies: bool,
}

impl HasAuthState for AuthState {
    fn jwt(&self) -> &JwtConfig {
        &self.jwt
    }
}

pub fn router(state: AuthState, rate_limits: Option<Arc<RateLimitConfig>>) -> Router {
    let mut credentials = Router::new().route("/login", post(login));
    let mut signup = Router::new().route("/register", post(register));

    if let Some(limits) = rate_limits {
        credentials = credentials.layer(middleware::from_fn_with_state(
            limits.clone(),
            rate_limit_login,
        ));
        signup = signup.layer(middleware::from_fn_with_state(limits, rate_limit_register));
    }

    Router::new()
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(revoke_session))
        .merge(credentials)
        .merge(signup)
        .with_state(state)
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    remember: bool,
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    display_name: String,
    password: String,
    #[serde(default)]
    remember: bool,
}

/// Response body for every endpoint that starts or renews a session.
#[derive(Serialize)]
struct SessionResponse {
    access_token: String,
    expires_in: u64,
    user: UserIdentity,
}

/// Issue a token pair, persist the refresh record, and build the cookie.
async fn start_session(
    state: &AuthState,
    identity: &UserIdentity,
    user_id: i64,
    remember: bool,
) -> Result<(SessionResponse, String), ApiError> {
    let issued = state.jwt.issue(identity).map_err(|e| {
        error!("Failed to issue tokens: {}", e);
        ApiError::internal("Failed to issue tokens")
    })?;

    state
        .db
        .refresh_tokens()
        .create(&NewRefreshToken {
            user_id,
            token_hash: &issued.refresh_hash,
            remember,
            expires_at: issued.refresh_expires_at,
        })
        .await
        .db_err("Failed to store refresh token")?;

    let max_age = remember.then(|| state.jwt.lifetimes().refresh_secs);
    let cookie = refresh_cookie(&issued.refresh_secret, max_age, state.secure_cookies);

    Ok((
        SessionResponse {
            access_token: issued.access_token,
            expires_in: issued.access_expires_in,
            user: identity.clone(),
        },
        cookie,
    ))
}

/// Create a new player account and log it in.
async fn register(
    State(state): State<AuthState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim();
    let display_name = req.display_name.trim();

    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }
    if display_name.is_empty() {
        return Err(ApiError::bad_request("Display name cannot be empty"));
    }
    if req.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    if !state
        .db
        .users()
        .is_email_available(email)
        .await
        .db_err("Failed to check email availability")?
    {
        return Err(ApiError::conflict("Email address is already registered"));
    }

    let password_hash = password::hash_password(&req.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to create account")
    })?;

    let uuid = Uuid::new_v4().to_string();
    let user_id = state
        .db
        .users()
        .create(&uuid, email, display_name, &password_hash, UserRole::Player)
        .await
        .db_err("Failed to create user")?;

    let identity = UserIdentity {
        uuid,
        email: email.to_string(),
        display_name: display_name.to_string(),
        role: UserRole::Player,
    };

    let (body, cookie) = start_session(&state, &identity, user_id, req.remember).await?;
    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(body)))
}

/// Exchange email + password for an access token and a refresh cookie.
/// The rejection message never distinguishes unknown email from wrong
/// password.
async fn login(
    State(state): State<AuthState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(req.email.trim())
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user else {
        return Err(ApiError::unauthorized("Invalid email or password"));
    };
    if !password::verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    let identity = user.identity();
    let (body, cookie) = start_session(&state, &identity, user.id, req.remember).await?;
    Ok((StatusCode::OK, [(SET_COOKIE, cookie)], Json(body)))
}

/// 401 response that also expires the refresh cookie.
fn reject_refresh(secure_cookies: bool, msg: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(SET_COOKIE, clear_refresh_cookie(secure_cookies))],
        Json(serde_json::json!({ "error": msg })),
    )
        .into_response()
}

/// Rotate the presented refresh token and mint a new access token.
///
/// Rotate-on-use: the presented record is revoked in the same transaction
/// that creates its replacement, so a captured secret works at most once.
/// A revoked secret presented again is treated as evidence of theft and
/// revokes every session of that user.
async fn refresh(
    State(state): State<AuthState>,
    request: axum::extract::Request,
) -> Result<Response, ApiError> {
    let (parts, _body) = request.into_parts();

    let Some(secret) = get_cookie(&parts.headers, REFRESH_COOKIE_NAME) else {
        return Ok(reject_refresh(state.secure_cookies, "No refresh token"));
    };

    let store = state.db.refresh_tokens();
    let record = store
        .find_by_hash(&hash_refresh_secret(secret))
        .await
        .db_err("Failed to look up refresh token")?;

    let Some(record) = record else {
        return Ok(reject_refresh(state.secure_cookies, "Invalid refresh token"));
    };

    if record.is_revoked() {
        warn!(
            user_id = record.user_id,
            "Revoked refresh token presented again; revoking all sessions"
        );
        store
            .revoke_all_for_user(record.user_id)
            .await
            .db_err("Failed to revoke sessions")?;
        return Ok(reject_refresh(
            state.secure_cookies,
            "Refresh token has been revoked",
        ));
    }

    let now = unix_now().map_err(|e| {
        error!("Clock error: {}", e);
        ApiError::internal("Clock error")
    })? as i64;
    if record.is_expired(now) {
        return Ok(reject_refresh(
            state.secure_cookies,
            "Refresh token has expired",
        ));
    }

    let user = state
        .db
        .users()
        .get_by_id(record.user_id)
        .await
        .db_err("Failed to load user")?;
    let Some(user) = user else {
        return Ok(reject_refresh(state.secure_cookies, "User no longer exists"));
    };

    let identity = user.identity();
    let issued = state.jwt.issue(&identity).map_err(|e| {
        error!("Failed to issue tokens: {}", e);
        ApiError::internal("Failed to issue tokens")
    })?;

    let rotated = store
        .rotate(
            record.id,
            &NewRefreshToken {
                user_id: user.id,
                token_hash: &issued.refresh_hash,
                remember: record.remember,
                expires_at: issued.refresh_expires_at,
            },
        )
        .await
        .db_err("Failed to rotate refresh token")?;

    if rotated.is_none() {
        // A concurrent presentation of the same secret won the rotation
        // race; this presentation is functionally a replay.
        warn!(
            user_id = user.id,
            "Lost refresh rotation race; revoking all sessions"
        );
        store
            .revoke_all_for_user(user.id)
            .await
            .db_err("Failed to revoke sessions")?;
        return Ok(reject_refresh(
            state.secure_cookies,
            "Refresh token has been revoked",
        ));
    }

    let max_age = record.remember.then(|| state.jwt.lifetimes().refresh_secs);
    let cookie = refresh_cookie(&issued.refresh_secret, max_age, state.secure_cookies);

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(SessionResponse {
            access_token: issued.access_token,
            expires_in: issued.access_expires_in,
            user: identity,
        }),
    )
        .into_response())
}

/// Revoke the presented refresh token and clear the cookie.
/// Always succeeds: logout must be effective even with a stale or missing
/// token.
async fn logout(
    State(state): State<AuthState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, _body) = request.into_parts();

    if let Some(secret) = get_cookie(&parts.headers, REFRESH_COOKIE_NAME) {
        match state
            .db
            .refresh_tokens()
            .find_by_hash(&hash_refresh_secret(secret))
            .await
        {
            Ok(Some(record)) => {
                let _ = state.db.refresh_tokens().revoke(record.id).await;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to look up refresh token during logout: {}", e),
        }
    }

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_refresh_cookie(state.secure_cookies))],
        Json(serde_json::json!({ "success": true })),
    ))
}

/// Return the identity carried by the presented access token.
async fn me(Authed(identity): Authed) -> Json<UserIdentity> {
    Json(identity)
}

#[derive(Serialize)]
struct SessionInfo {
    id: i64,
    created_at: i64,
    expires_at: i64,
    remember: bool,
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

/// List the caller's active refresh sessions.
async fn list_sessions(
    State(state): State<AuthState>,
    Authed(identity): Authed,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(&identity.uuid)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    let sessions = state
        .db
        .refresh_tokens()
        .list_active(user.id)
        .await
        .db_err("Failed to list sessions")?
        .into_iter()
        .map(|r| SessionInfo {
            id: r.id,
            created_at: r.created_at,
            expires_at: r.expires_at,
            remember: r.remember,
        })
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke a specific refresh session.
/// Users can revoke their own sessions, admins can revoke any.
async fn revoke_session(
    State(state): State<AuthState>,
    Authed(identity): Authed,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .db
        .refresh_tokens()
        .get(id)
        .await
        .db_err("Failed to get session")?;

    let Some(record) = record else {
        // Already revoked and swept, or never existed.
        return Ok(Json(RevokeResponse { revoked: false }));
    };

    let caller = state
        .db
        .users()
        .get_by_uuid(&identity.uuid)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    if record.user_id != caller.id && identity.role != UserRole::Admin {
        return Err(ApiError::forbidden("Cannot revoke another user's session"));
    }

    let revoked = state
        .db
        .refresh_tokens()
        .revoke(id)
        .await
        .db_err("Failed to revoke session")?;

    Ok(Json(RevokeResponse { revoked }))
}
