//! Microsoft Graph API client
//!
//! Provides a typed HTTP client for interacting with the Microsoft Graph API.
//! Handles authentication headers, endpoint construction and the mapping of
//! error responses onto [`GraphError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use onemirror_graph::auth::StaticTokenSource;
//! use onemirror_graph::client::GraphClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = GraphClient::new(Arc::new(StaticTokenSource::new("access-token-here")));
//! let url = client.drive_item_url("/Documents", Some("delta"))?;
//! let response = client.get(&url).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use onemirror_core::ports::IAccessTokenSource;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::retry::retry_after_from_headers;
use crate::GraphError;

/// Base URL for Microsoft Graph API v1.0
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Error codes Graph uses to signal that a delta token must be dropped
const RESYNC_ERROR_CODES: &[&str] = &[
    "resyncRequired",
    "resyncChangesApplyDifferences",
    "resyncChangesUploadDifferences",
];

// ============================================================================
// Graph API error body
// ============================================================================

/// Error envelope returned by Graph on non-success responses
#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

// ============================================================================
// GraphClient
// ============================================================================

/// HTTP client for Microsoft Graph API calls
///
/// Wraps `reqwest::Client` with bearer authentication (obtained per request
/// from an [`IAccessTokenSource`]) and base URL construction.
pub struct GraphClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests
    base_url: String,
    /// Supplier of access tokens
    tokens: Arc<dyn IAccessTokenSource>,
}

impl GraphClient {
    /// Creates a new GraphClient talking to the public Graph endpoint
    pub fn new(tokens: Arc<dyn IAccessTokenSource>) -> Self {
        Self::with_base_url(tokens, GRAPH_BASE_URL)
    }

    /// Creates a new GraphClient with a custom base URL (useful for testing)
    pub fn with_base_url(tokens: Arc<dyn IAccessTokenSource>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            tokens,
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins an API path (e.g. `/me/drive/items/{id}/content`) onto the base URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Builds the URL addressing a drive item by path
    ///
    /// `/` (or an empty path) addresses the drive root as `/me/drive/root`;
    /// any other path uses the colon syntax `/me/drive/root:/a/b:`. An
    /// optional action segment such as `delta` is appended. Path components
    /// are percent-encoded.
    pub fn drive_item_url(&self, remote_path: &str, action: Option<&str>) -> Result<String, GraphError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GraphError::InvalidRequest(format!("bad base URL {}: {e}", self.base_url)))?;

        let components: Vec<&str> = remote_path.split('/').filter(|c| !c.is_empty()).collect();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                GraphError::InvalidRequest(format!("base URL cannot have a path: {}", self.base_url))
            })?;
            segments.pop_if_empty().extend(["me", "drive"]);

            match components.split_last() {
                None => {
                    segments.push("root");
                }
                Some((last, parents)) => {
                    segments.push("root:");
                    segments.extend(parents.iter().copied());
                    segments.push(&format!("{last}:"));
                }
            }

            if let Some(action) = action {
                segments.push(action);
            }
        }

        Ok(url.into())
    }

    /// Creates an authenticated GET request for an absolute URL
    async fn authorized(&self, url: &str) -> Result<RequestBuilder, GraphError> {
        let token = self.tokens.access_token().await.map_err(GraphError::Auth)?;
        Ok(self.client.get(url).bearer_auth(token))
    }

    /// Sends an authenticated GET and classifies the response status
    ///
    /// A 401 marks the token as rejected so the retry uses a refreshed one.
    pub async fn get(&self, url: &str) -> Result<Response, GraphError> {
        debug!(url, "GET");
        let response = self.authorized(url).await?.send().await?;
        let result = check_status(response).await;
        if let Err(GraphError::Status { status: 401, .. }) = &result {
            self.tokens.invalidate().await;
        }
        result
    }

    /// Sends an unauthenticated GET (pre-authenticated download URLs)
    pub async fn get_anonymous(&self, url: &str) -> Result<Response, GraphError> {
        debug!("GET (pre-authenticated URL)");
        let response = self.client.get(url).send().await?;
        check_status(response).await
    }

    /// Sends an authenticated GET and deserializes the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GraphError> {
        let body = self.get(url).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| GraphError::InvalidResponse(e.to_string()))
    }
}

/// Maps a non-success response onto the matching [`GraphError`]
///
/// 410 Gone and the `resync*` error codes mean the delta token must be
/// dropped; 404 means the object is gone; everything else is reported with
/// its status and `Retry-After` hint.
async fn check_status(response: Response) -> Result<Response, GraphError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let retry_after = retry_after_from_headers(response.headers());
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<GraphErrorBody>(&body)
        .ok()
        .map(|b| b.error);
    let code = detail.as_ref().and_then(|d| d.code.clone());
    let message = detail
        .and_then(|d| d.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown status").to_string());

    let resync_code = code
        .as_deref()
        .is_some_and(|c| RESYNC_ERROR_CODES.contains(&c));
    if status == StatusCode::GONE || resync_code {
        return Err(GraphError::ResyncRequired(message));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(GraphError::NotFound(url));
    }

    Err(GraphError::Status {
        status: status.as_u16(),
        retry_after,
        message,
    })
}
