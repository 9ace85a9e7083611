//! Route access decisions derived from the current session.

use url::form_urlencoded;

use super::session::{SessionHandle, SessionStatus};
use crate::identity::UserRole;

/// Outcome of a route access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAccess {
    /// The caller may enter the route.
    Granted,
    /// Not authenticated: send the caller to the login page, carrying the
    /// originally requested path so it can be resumed after login.
    RedirectToLogin { redirect: String },
    /// Authenticated but lacking a required role.
    Forbidden,
}

/// Synchronous guard over a [`SessionHandle`].
#[derive(Clone)]
pub struct RouteGuard {
    session: SessionHandle,
    login_path: String,
}

impl RouteGuard {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            login_path: "/login".to_string(),
        }
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Decide access for a route. `required_roles` empty means any
    /// authenticated user is admitted. A session mid-refresh still counts
    /// as authenticated; the guard never blocks on token renewal.
    pub fn check(&self, return_to: &str, required_roles: &[UserRole]) -> RouteAccess {
        let session = self.session.snapshot();
        let authenticated = matches!(
            session.status,
            SessionStatus::Authenticated | SessionStatus::Refreshing
        );

        let Some(user) = session.user.filter(|_| authenticated) else {
            let query: String = form_urlencoded::Serializer::new(String::new())
                .append_pair("returnUrl", return_to)
                .finish();
            return RouteAccess::RedirectToLogin {
                redirect: format!("{}?{}", self.login_path, query),
            };
        };

        if required_roles.is_empty() || required_roles.contains(&user.role) {
            RouteAccess::Granted
        } else {
            RouteAccess::Forbidden
        }
    }
}
