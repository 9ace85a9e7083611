//! Client session orchestration.
//!
//! A [`SessionHandle`] is the single source of truth for "who is logged
//! in". It owns the HTTP client (whose cookie jar carries the refresh
//! secret), drives login, logout, and silent restoration, and exposes the
//! session as a `watch` channel for reactive consumers such as route
//! guards.
//!
//! Refresh is single-flight: concurrent callers share one in-flight future
//! instead of issuing duplicate round-trips, which would race against the
//! server's rotate-on-use invariant.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use url::Url;

use super::error::ClientError;
use crate::identity::{UserIdentity, UserRole};

/// Login endpoint path.
pub const LOGIN_PATH: &str = "/api/auth/login";
/// Refresh endpoint path. A 401 from here is never retried.
pub const REFRESH_PATH: &str = "/api/auth/refresh";
/// Logout endpoint path.
pub const LOGOUT_PATH: &str = "/api/auth/logout";
/// Current-user endpoint path.
pub const ME_PATH: &str = "/api/auth/me";

/// Session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

/// Client-side session snapshot, broadcast on every transition.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: Option<UserIdentity>,
    pub status: SessionStatus,
}

impl Session {
    fn anonymous() -> Self {
        Self {
            user: None,
            status: SessionStatus::Anonymous,
        }
    }
}

/// Body of every server response that starts or renews a session.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    expires_in: u64,
    user: UserIdentity,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), ClientError>>>;

struct SessionInner {
    http: reqwest::Client,
    base_url: Url,
    state: watch::Sender<Session>,
    access_token: Mutex<Option<String>>,
    /// In-flight refresh shared by every concurrent caller.
    pending_refresh: Mutex<Option<SharedRefresh>>,
    /// Serializes login and logout. Refresh coordinates itself and must
    /// not wait here: a logout during refresh clears state immediately.
    op_lock: tokio::sync::Mutex<()>,
    /// Bumped on logout. A refresh that resolves against a stale epoch is
    /// discarded instead of reviving the cleared session.
    epoch: AtomicU64,
}

/// Handle to the client session. Cheap to clone; all clones observe the
/// same session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    /// Create a session handle with its own cookie jar.
    pub fn new(base_url: Url) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    /// Create a session handle backed by a shared cookie jar, used to
    /// restore a session persisted from an earlier process.
    pub fn with_cookie_jar(
        base_url: Url,
        jar: Arc<reqwest::cookie::Jar>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_provider(jar).build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    /// Create a session handle around an existing HTTP client. The client
    /// must have a cookie store, otherwise the refresh secret is lost.
    pub fn with_http_client(http: reqwest::Client, base_url: Url) -> Self {
        let (state, _) = watch::channel(Session::anonymous());
        Self {
            inner: Arc::new(SessionInner {
                http,
                base_url,
                state,
                access_token: Mutex::new(None),
                pending_refresh: Mutex::new(None),
                op_lock: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Current session snapshot.
    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// The currently authenticated user, if any.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        let session = self.inner.state.borrow();
        session.user.is_some()
            && matches!(
                session.status,
                SessionStatus::Authenticated | SessionStatus::Refreshing
            )
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.inner
            .state
            .borrow()
            .user
            .as_ref()
            .is_some_and(|u| u.role == role)
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// The current access token, attached by the request coordinator as a
    /// bearer credential.
    pub fn access_token(&self) -> Option<String> {
        self.inner.access_token.lock().unwrap().clone()
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ClientError::Network(format!("invalid request URL {}: {}", path, e)))
    }

    /// Log in with email and password.
    ///
    /// On success the refresh secret lands in the cookie jar and the
    /// session becomes `Authenticated`. On failure the session returns to
    /// `Anonymous` and the error is surfaced once; no automatic retry.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<UserIdentity, ClientError> {
        let _guard = self.inner.op_lock.lock().await;

        self.inner.state.send_replace(Session {
            user: None,
            status: SessionStatus::Authenticating,
        });

        let outcome = self.request_login(email, password, remember).await;
        match outcome {
            Ok(tokens) => {
                self.inner.state.send_modify(|session| {
                    *self.inner.access_token.lock().unwrap() = Some(tokens.access_token.clone());
                    session.user = Some(tokens.user.clone());
                    session.status = SessionStatus::Authenticated;
                });
                Ok(tokens.user)
            }
            Err(e) => {
                self.clear_local();
                Err(e)
            }
        }
    }

    async fn request_login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
    ) -> Result<TokenResponse, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint(LOGIN_PATH)?)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "remember": remember,
            }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(ClientError::InvalidCredentials),
            status => Err(ClientError::Network(format!(
                "login failed with status {}",
                status
            ))),
        }
    }

    /// Attempt silent session restoration from a stored refresh cookie.
    /// This is a background probe: failure leaves the session `Anonymous`
    /// and is never surfaced to the user.
    pub async fn initialize_from_storage(&self) {
        if self.snapshot().status != SessionStatus::Anonymous {
            return;
        }
        if let Err(e) = self.refresh().await {
            tracing::debug!("Silent session restoration failed: {}", e);
        }
    }

    /// Refresh the access token, single-flight.
    ///
    /// A caller arriving while a refresh is already in flight joins the
    /// pending future and observes its outcome instead of starting a
    /// second round-trip.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let fut = {
            let mut pending = self.inner.pending_refresh.lock().unwrap();
            match pending.as_ref() {
                Some(fut) => fut.clone(),
                None => {
                    let handle = self.clone();
                    let epoch = self.inner.epoch.load(Ordering::SeqCst);
                    let fut: SharedRefresh =
                        async move { handle.run_refresh(epoch).await }.boxed().shared();
                    *pending = Some(fut.clone());
                    fut
                }
            }
        };
        fut.await
    }

    async fn run_refresh(self, epoch: u64) -> Result<(), ClientError> {
        self.inner.state.send_modify(|session| {
            if self.inner.epoch.load(Ordering::SeqCst) == epoch {
                session.status = SessionStatus::Refreshing;
            }
        });

        let outcome = self.request_refresh().await;

        // Open the gate before reporting so the next failure cohort starts
        // a fresh refresh.
        self.inner.pending_refresh.lock().unwrap().take();

        match outcome {
            Ok(tokens) => {
                let mut applied = false;
                self.inner.state.send_modify(|session| {
                    if self.inner.epoch.load(Ordering::SeqCst) == epoch {
                        *self.inner.access_token.lock().unwrap() =
                            Some(tokens.access_token.clone());
                        session.user = Some(tokens.user.clone());
                        session.status = SessionStatus::Authenticated;
                        applied = true;
                    }
                });
                if applied {
                    Ok(())
                } else {
                    // A logout raced this refresh; the result is discarded
                    // rather than reviving the cleared session.
                    Err(ClientError::SessionExpired)
                }
            }
            Err(e) => {
                if self.inner.epoch.load(Ordering::SeqCst) == epoch {
                    self.clear_local();
                }
                Err(match e {
                    ClientError::Unauthorized => ClientError::SessionExpired,
                    other => other,
                })
            }
        }
    }

    async fn request_refresh(&self) -> Result<TokenResponse, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint(REFRESH_PATH)?)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => Err(ClientError::Network(format!(
                "refresh failed with status {}",
                status
            ))),
        }
    }

    /// Log out. Local state is cleared unconditionally and immediately;
    /// the server-side revocation is best-effort.
    pub async fn logout(&self) {
        let _guard = self.inner.op_lock.lock().await;

        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.clear_local();

        match self.endpoint(LOGOUT_PATH) {
            Ok(url) => {
                if let Err(e) = self.inner.http.post(url).send().await {
                    tracing::debug!("Server logout call failed: {}", e);
                }
            }
            Err(e) => tracing::debug!("Server logout call failed: {}", e),
        }
    }

    /// Drop the session locally after the refresh endpoint itself rejected
    /// us. Bumps the epoch so any in-flight refresh outcome is discarded.
    pub(crate) fn expire_local(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.clear_local();
    }

    fn clear_local(&self) {
        self.inner.state.send_modify(|session| {
            *self.inner.access_token.lock().unwrap() = None;
            session.user = None;
            session.status = SessionStatus::Anonymous;
        });
    }

    /// Force the session into a given state. Test-only.
    #[cfg(test)]
    pub(crate) fn set_state_for_tests(&self, user: Option<UserIdentity>, status: SessionStatus) {
        self.inner
            .state
            .send_replace(Session { user, status });
    }
}
