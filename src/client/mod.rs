//! Client-side session management: orchestrated login/logout/refresh, an
//! authenticated request coordinator, and route guards.

mod error;
mod guard;
mod http;
mod session;

pub use error::ClientError;
pub use guard::{RouteAccess, RouteGuard};
pub use http::ApiClient;
pub use session::{
    LOGIN_PATH, LOGOUT_PATH, ME_PATH, REFRESH_PATH, Session, SessionHandle, SessionStatus,
};
