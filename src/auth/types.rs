// Authentication types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default token lifetime when the server omits `expires_in`
pub const DEFAULT_EXPIRES_IN: f64 = 3600.0;

/// Resolved NSP credentials
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub server: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Persisted token state, written and replaced as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix epoch seconds (fractional)
    pub expiry_epoch_seconds: f64,
}

impl TokenRecord {
    /// Build a record from a grant response received at `now_epoch`
    ///
    /// `fallback_refresh` is kept when the server does not rotate the refresh token.
    pub fn from_response(response: TokenResponse, now_epoch: f64, fallback_refresh: &str) -> Self {
        let expires_in = response
            .expires_in
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| fallback_refresh.to_string()),
            expiry_epoch_seconds: now_epoch + expires_in,
        }
    }
}

/// Grant request body
#[derive(Debug, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum GrantRequest<'a> {
    ClientCredentials,
    RefreshToken { refresh_token: &'a str },
}

/// Grant response body
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; integral or fractional on the wire
    pub expires_in: Option<f64>,
}

/// Error body returned by the auth endpoint on rejection
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// How the returned token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Cached,
    Refreshed,
    Reacquired,
}

/// Validated `(server, access_token)` pair handed to collaborators
#[derive(Clone, PartialEq)]
pub struct ValidToken {
    pub server: String,
    pub access_token: String,
    pub origin: TokenOrigin,
}

impl ValidToken {
    /// Token prefix safe for logs and terminal output
    pub fn preview(&self) -> &str {
        token_preview(&self.access_token)
    }
}

impl fmt::Debug for ValidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidToken")
            .field("server", &self.server)
            .field("access_token", &format!("{}...", self.preview()))
            .field("origin", &self.origin)
            .finish()
    }
}

/// First 20 characters of a token
pub fn token_preview(token: &str) -> &str {
    match token.char_indices().nth(20) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}

/// Token lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoToken,
    CachedValid,
    Expired,
    Refreshing,
    Reacquiring,
    Valid,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::NoToken => "no_token",
            LifecycleState::CachedValid => "cached_valid",
            LifecycleState::Expired => "expired",
            LifecycleState::Refreshing => "refreshing",
            LifecycleState::Reacquiring => "reacquiring",
            LifecycleState::Valid => "valid",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}
