//! OAuth2 authentication for Microsoft Graph API
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for a
//! command-line application: the user opens the authorization URL in any
//! browser and pastes back the URL of the page they were redirected to.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Configuration for the OAuth2 flow
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange/refresh logic
//! - [`extract_code`] - Pulls the authorization code out of a redirect URL
//! - [`TokenStore`] - Reads and writes tokens in the key/value store
//! - [`StoredTokenSource`] - Self-refreshing [`IAccessTokenSource`]
//! - [`StaticTokenSource`] - Fixed token, for tests and scripting

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, ErrorResponse, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use onemirror_core::config::AuthConfig;
use onemirror_core::ports::{IAccessTokenSource, ICursorStore, Tokens};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default Microsoft OAuth2 authorization endpoint (common tenant)
const AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";

/// Default Microsoft OAuth2 token endpoint (common tenant)
const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Key under which tokens are stored
pub const TOKENS_KEY: &str = "tokens";

/// Tokens are refreshed when they expire within this many seconds
const REFRESH_MARGIN_SECS: i64 = 300;

/// Upper bound on a reported `expires_in`
const MAX_TOKEN_LIFETIME_SECS: u64 = 86_400;

/// The token endpoint could not be reached or answered with garbage
///
/// Unlike an OAuth error response (`invalid_grant` and friends) this is
/// worth retrying later with the same refresh token.
#[derive(Debug, Error)]
#[error("Token endpoint unavailable: {0}")]
pub struct TokenEndpointUnavailable(pub String);

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for the OAuth2 PKCE authentication flow
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    /// Application (client) ID
    pub app_id: String,
    /// Client secret for confidential registrations
    pub client_secret: Option<String>,
    /// Redirect URI for receiving the authorization code
    pub redirect_uri: String,
    /// OAuth scopes to request
    pub scopes: Vec<String>,
    /// Authorization endpoint
    pub auth_url: String,
    /// Token endpoint
    pub token_url: String,
}

impl OAuth2Config {
    /// Builds the flow configuration from the `auth` config section
    ///
    /// # Errors
    /// Fails if no application ID is configured
    pub fn from_config(auth: &AuthConfig) -> Result<Self> {
        let app_id = auth
            .app_id
            .clone()
            .filter(|id| !id.is_empty())
            .context("auth.app_id is not configured")?;
        Ok(Self {
            app_id,
            client_secret: auth.client_secret.clone(),
            redirect_uri: auth.redirect_uri.clone(),
            scopes: auth.scopes.clone(),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        })
    }

    /// Overrides the identity provider endpoints
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl PKCEFlow {
    /// Creates a new PKCEFlow with the given configuration
    pub fn new(config: &OAuth2Config) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.app_id.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri.clone()).context("Invalid redirect URI")?,
            );
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes.clone(),
        })
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// # Returns
    /// A tuple of `(authorization_url, csrf_token, pkce_verifier)`.
    /// The `pkce_verifier` must be kept until the code exchange step.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request.set_pkce_challenge(pkce_challenge).url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for OAuth tokens
    pub async fn exchange_code(&self, code: String, pkce_verifier: PkceCodeVerifier) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expiry(token_result.expires_in()),
        })
    }

    /// Obtains a fresh access token using a refresh token
    ///
    /// The previous refresh token is kept if the provider does not rotate it.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing access token");

        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| refresh_failure(e).context("Failed to refresh token"))?;

        Ok(Tokens {
            access_token: token_result.access_token().secret().to_string(),
            refresh_token: token_result
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expiry(token_result.expires_in()),
        })
    }
}

/// Separates retryable transport failures from OAuth error responses
fn refresh_failure<RE, T>(err: RequestTokenError<RE, T>) -> anyhow::Error
where
    RE: std::error::Error + Send + Sync + 'static,
    T: ErrorResponse + Send + Sync + 'static,
{
    match err {
        RequestTokenError::ServerResponse(_) => anyhow::Error::new(err),
        other => anyhow::Error::new(TokenEndpointUnavailable(other.to_string())),
    }
}

fn expiry(expires_in: Option<std::time::Duration>) -> chrono::DateTime<Utc> {
    let secs = expires_in.map_or(3600, |d| d.as_secs().min(MAX_TOKEN_LIFETIME_SECS) as i64);
    Utc::now() + Duration::seconds(secs)
}

/// Extracts the authorization code from the URL the browser was redirected to
///
/// # Errors
/// Fails if the URL carries an OAuth error, a mismatched `state`, or no code.
pub fn extract_code(redirect_url: &str, expected_state: &CsrfToken) -> Result<String> {
    let url = url::Url::parse(redirect_url.trim())
        .with_context(|| format!("Not a valid URL: {redirect_url}"))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        bail!(
            "Authorization failed: {error}: {}",
            description.unwrap_or_default()
        );
    }
    if state.as_deref() != Some(expected_state.secret().as_str()) {
        bail!("Authorization response state does not match the request");
    }
    code.filter(|c| !c.is_empty())
        .with_context(|| format!("Could not find a valid auth code in: {redirect_url}"))
}

// ============================================================================
// TokenStore
// ============================================================================

/// Token persistence on top of the key/value store
#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn ICursorStore>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn ICursorStore>) -> Self {
        Self { store }
    }

    /// Loads stored tokens, if any
    pub async fn load(&self) -> Result<Option<Tokens>> {
        match self.store.get(TOKENS_KEY).await? {
            Some(json) => {
                let tokens = serde_json::from_str(&json).context("Failed to deserialize stored tokens")?;
                Ok(Some(tokens))
            }
            None => Ok(None),
        }
    }

    /// Stores and commits tokens
    pub async fn save(&self, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        self.store.set(TOKENS_KEY, &json).await?;
        self.store.commit().await?;
        debug!("Stored tokens");
        Ok(())
    }

    /// Removes stored tokens
    pub async fn clear(&self) -> Result<()> {
        self.store.remove(TOKENS_KEY).await?;
        self.store.commit().await?;
        info!("Cleared stored tokens");
        Ok(())
    }
}

// ============================================================================
// StoredTokenSource
// ============================================================================

/// [`IAccessTokenSource`] backed by stored tokens, refreshed before expiry
///
/// A token rejected by the API (see [`IAccessTokenSource::invalidate`]) is
/// refreshed on the next request even if it has not expired yet.
pub struct StoredTokenSource {
    flow: PKCEFlow,
    store: TokenStore,
    cached: Mutex<Option<Tokens>>,
    rejected: AtomicBool,
}

impl StoredTokenSource {
    pub fn new(flow: PKCEFlow, store: TokenStore) -> Self {
        Self {
            flow,
            store,
            cached: Mutex::new(None),
            rejected: AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl IAccessTokenSource for StoredTokenSource {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        let tokens = match cached.take() {
            Some(tokens) => tokens,
            None => self
                .store
                .load()
                .await?
                .context("Not logged in; run `onemirror auth login` first")?,
        };

        let rejected = self.rejected.load(Ordering::Acquire);
        let tokens = if rejected || tokens.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
            let Some(refresh) = tokens.refresh_token.as_deref() else {
                bail!("Access token expired and no refresh token is stored; log in again");
            };
            let fresh = self.flow.refresh_token(refresh).await?;
            self.store.save(&fresh).await?;
            self.rejected.store(false, Ordering::Release);
            fresh
        } else {
            tokens
        };

        let access = tokens.access_token.clone();
        *cached = Some(tokens);
        Ok(access)
    }

    async fn invalidate(&self) {
        warn!("Access token rejected, it will be refreshed");
        self.rejected.store(true, Ordering::Release);
        self.cached.lock().await.take();
    }
}

// ============================================================================
// StaticTokenSource
// ============================================================================

/// [`IAccessTokenSource`] returning a fixed token
pub struct StaticTokenSource(String);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl IAccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
