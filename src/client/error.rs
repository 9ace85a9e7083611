//! Client-side error taxonomy.

/// Errors surfaced by the client session machinery.
///
/// Clone is required so a single-flight refresh outcome can be shared by
/// every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Login rejected. User-facing, never retried automatically.
    InvalidCredentials,
    /// A protected call was rejected and refresh could not fix it.
    Unauthorized,
    /// Authenticated but the wrong role. Refresh can never fix this.
    Forbidden,
    /// The refresh token was rejected; the session has been cleared.
    SessionExpired,
    /// Transport failure or server-side outage. Surfaced once, no
    /// automatic retry.
    Network(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::InvalidCredentials => write!(f, "Invalid email or password"),
            ClientError::Unauthorized => write!(f, "Not authorized"),
            ClientError::Forbidden => write!(f, "Insufficient role"),
            ClientError::SessionExpired => write!(f, "Session expired"),
            ClientError::Network(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}
