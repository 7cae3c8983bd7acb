//! Credential port (driven/secondary port)
//!
//! The engine never handles credentials itself. Adapters that issue
//! authenticated requests obtain bearer tokens through
//! [`IAccessTokenSource`], which is responsible for refreshing them
//! before they expire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OAuth tokens received from the identity provider
///
/// Contains the access token for API requests, an optional refresh token
/// for obtaining new access tokens, and the expiration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    /// (requires `offline_access` scope)
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

/// Supplies a currently-valid bearer token
#[async_trait::async_trait]
pub trait IAccessTokenSource: Send + Sync {
    /// Returns an access token, refreshing it first if it is about to expire
    async fn access_token(&self) -> anyhow::Result<String>;

    /// Marks the last returned token as rejected by the API
    ///
    /// The next [`access_token`](Self::access_token) call must not hand out
    /// the same token again.
    async fn invalidate(&self) {}
}
