//! Credential validation for protected API routes.
//!
//! Access tokens arrive as bearer credentials and are validated statelessly:
//! signature, issuer, audience, and expiry. The extractor performs no I/O,
//! so protected requests never block on the refresh token store. Refresh
//! tokens arrive only in an HTTP-only cookie scoped to the auth endpoints.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::identity::UserIdentity;
use crate::jwt::JwtConfig;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "courtside_refresh";

/// Cookie path: the refresh secret is only ever sent to the auth endpoints.
pub const REFRESH_COOKIE_PATH: &str = "/api/auth";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract a bearer token from the Authorization header.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Build the Set-Cookie value carrying a refresh secret.
/// `max_age` is set only for remembered sessions; otherwise the cookie
/// lives for the browser session.
pub fn refresh_cookie(secret: &str, max_age: Option<u64>, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path={}",
        REFRESH_COOKIE_NAME, secret, REFRESH_COOKIE_PATH
    );
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the Set-Cookie value that expires the refresh cookie.
pub fn clear_refresh_cookie(secure: bool) -> String {
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Lax; Path={}; Max-Age=0",
        REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Authentication errors (JSON responses).
#[derive(Debug)]
pub enum AuthError {
    NotAuthenticated,
    InvalidToken,
}

impl AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Not authenticated",
            Self::InvalidToken => "Invalid or expired token",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// Trait for state types that support credential validation.
pub trait HasAuthState {
    fn jwt(&self) -> &JwtConfig;
}

/// Extractor for endpoints that require a valid access token.
/// Resolves the claims into a typed [`UserIdentity`]; fails closed with
/// 401 on any anomaly.
pub struct Authed(pub UserIdentity);

impl<S> FromRequestParts<S> for Authed
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::NotAuthenticated)?;

        let claims = state
            .jwt()
            .validate_access_token(token)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(Authed(claims.identity()))
    }
}
