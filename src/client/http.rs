//! Authenticated request coordinator.
//!
//! [`ApiClient`] wraps a [`SessionHandle`] and attaches the bearer access
//! token to outgoing requests. On a 401 it joins the session's
//! single-flight refresh and retries the request exactly once; auth-flow
//! endpoints (login, refresh, logout) are never retried, since a 401 there
//! is the answer, not a stale token.

use reqwest::{Method, StatusCode};

use super::error::ClientError;
use super::session::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH, SessionHandle};

/// HTTP client for authenticated API calls.
#[derive(Clone)]
pub struct ApiClient {
    session: SessionHandle,
}

impl ApiClient {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ClientError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    pub async fn put(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ClientError> {
        self.execute(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<reqwest::Response, ClientError> {
        self.execute(Method::DELETE, path, None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let response = self.dispatch(&method, path, &body).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return classify(response);
        }

        match path {
            REFRESH_PATH => {
                // The refresh secret itself was rejected; the session is
                // over and a retry would loop.
                self.session.expire_local();
                Err(ClientError::SessionExpired)
            }
            LOGIN_PATH => Err(ClientError::InvalidCredentials),
            LOGOUT_PATH => Err(ClientError::Unauthorized),
            _ => {
                if self.session.refresh().await.is_err() {
                    // The refresh path already cleared the session.
                    return Err(ClientError::Unauthorized);
                }
                classify(self.dispatch(&method, path, &body).await?)
            }
        }
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: &Option<serde_json::Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.session.endpoint(path)?;
        let mut request = self.session.http().request(method.clone(), url);
        if let Some(token) = self.session.access_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }
}

fn classify(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ClientError::Forbidden),
        status if status.is_server_error() => Err(ClientError::Network(format!(
            "server error: {}",
            status
        ))),
        _ => Ok(response),
    }
}
