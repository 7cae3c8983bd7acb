//! OneMirror Graph - Microsoft Graph change feed adapter
//!
//! Provides the OneDrive implementation of the core ports:
//! - OAuth2 authentication (Authorization Code with PKCE) and token refresh
//! - Delta queries, one page per request
//! - Remote root lookup
//! - Streamed content download
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 PKCE flow and the stored, self-refreshing token source
//! - [`client`] - Authenticated HTTP client and response classification
//! - [`delta`] - Delta response types and parsing into change records
//! - [`provider`] - `IChangeFeed` implementation
//! - [`retry`] - `Retry-After` header parsing

pub mod auth;
pub mod client;
pub mod delta;
pub mod provider;
pub mod retry;

use std::time::Duration;

use onemirror_core::ports::FeedError;
use thiserror::Error;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// The delta token is no longer valid (410 Gone or a `resync*` error code)
    #[error("Resync required: {0}")]
    ResyncRequired(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Parsed `Retry-After` header, if present
        retry_after: Option<Duration>,
        /// Error message from the response body or the status reason
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A request URL could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No usable access token
    #[error("Authentication failed: {0}")]
    Auth(#[source] anyhow::Error),
}

impl From<GraphError> for FeedError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::ResyncRequired(_) => FeedError::Invalidated,
            GraphError::NotFound(what) => FeedError::NotFound(what),
            GraphError::Status {
                status,
                retry_after,
                message,
            } => FeedError::Transient {
                status: Some(status),
                retry_after,
                message,
            },
            GraphError::NetworkError(e) => FeedError::Transient {
                status: e.status().map(|s| s.as_u16()),
                retry_after: None,
                message: e.to_string(),
            },
            GraphError::InvalidResponse(msg) => {
                FeedError::Other(anyhow::anyhow!("Invalid Graph response: {msg}"))
            }
            GraphError::InvalidRequest(msg) => {
                FeedError::Other(anyhow::anyhow!("Invalid Graph request: {msg}"))
            }
            GraphError::Auth(e) if is_token_endpoint_outage(&e) => FeedError::Transient {
                status: None,
                retry_after: None,
                message: format!("{e:#}"),
            },
            GraphError::Auth(e) => FeedError::Other(e),
        }
    }
}

fn is_token_endpoint_outage(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<auth::TokenEndpointUnavailable>())
}
