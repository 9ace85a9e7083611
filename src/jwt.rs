//! Token issuance and validation.
//!
//! Dual-token scheme:
//! - Access tokens: short-lived signed JWTs carrying identity claims,
//!   validated statelessly on every protected request.
//! - Refresh tokens: opaque high-entropy secrets, stored server-side only
//!   as a SHA-256 hash and rotated on every use.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::identity::{UserIdentity, UserRole};

/// Issuer claim stamped into and required of every access token.
pub const TOKEN_ISSUER: &str = "courtside";

/// Audience claim stamped into and required of every access token.
pub const TOKEN_AUDIENCE: &str = "courtside-api";

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_LIFETIME_SECS: u64 = 15 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Number of random bytes in a refresh token secret.
const REFRESH_SECRET_BYTES: usize = 32;

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Email address
    pub email: String,
    /// Display name
    pub name: String,
    /// User role
    pub role: UserRole,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    /// Resolve the claims into a typed identity. Role is parsed exactly
    /// once here; downstream code never re-reads raw claim strings.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            uuid: self.sub.clone(),
            email: self.email.clone(),
            display_name: self.name.clone(),
            role: self.role,
        }
    }
}

/// Access and refresh token lifetimes, configurable for tests.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: DEFAULT_ACCESS_LIFETIME_SECS,
            refresh_secs: DEFAULT_REFRESH_LIFETIME_SECS,
        }
    }
}

/// A freshly minted access/refresh token pair.
///
/// `refresh_secret` is the only copy of the refresh token in plaintext; the
/// store persists `refresh_hash` and the secret travels in a cookie.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Signed access token
    pub access_token: String,
    /// Access token lifetime in seconds
    pub access_expires_in: u64,
    /// Opaque refresh secret (base64url)
    pub refresh_secret: String,
    /// SHA-256 hash of the refresh secret (hex)
    pub refresh_hash: String,
    /// Refresh expiration timestamp (Unix seconds)
    pub refresh_expires_at: i64,
}

/// Configuration for token operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl JwtConfig {
    /// Create a new token configuration with the given signing secret.
    pub fn new(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Mint an access token plus a fresh refresh secret for a user.
    pub fn issue(&self, user: &UserIdentity) -> Result<IssuedTokens, JwtError> {
        let now = unix_now()?;

        let claims = AccessClaims {
            sub: user.uuid.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            role: user.role,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + self.lifetimes.access_secs,
        };

        let access_token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        let refresh_secret = generate_refresh_secret();
        let refresh_hash = hash_refresh_secret(&refresh_secret);

        Ok(IssuedTokens {
            access_token,
            access_expires_in: self.lifetimes.access_secs,
            refresh_secret,
            refresh_hash,
            refresh_expires_at: (now + self.lifetimes.refresh_secs) as i64,
        })
    }

    /// Validate and decode an access token.
    ///
    /// Fails closed on any structural or cryptographic anomaly: bad
    /// signature, wrong issuer or audience, expiry, malformed claims.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        Ok(token_data.claims)
    }
}

/// Generate an opaque refresh secret from OS randomness.
pub fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a refresh secret for storage and lookup. The plaintext secret is
/// never persisted.
pub fn hash_refresh_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Current Unix timestamp in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
