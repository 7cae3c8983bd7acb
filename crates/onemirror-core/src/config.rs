//! Configuration module for OneMirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::ExclusionPattern;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for OneMirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mirror: MirrorConfig,
    pub auth: AuthConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Mirror relationship settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Local directory receiving the mirror.
    pub local_root: PathBuf,
    /// Remote folder to mirror, `/` for the whole drive.
    pub remote_root: String,
    /// Seconds to sleep after a pass that processed no records.
    pub poll_interval: u64,
    /// Optional regular expression; matching relative paths are not mirrored.
    pub exclude: Option<String>,
    /// Size of download chunks (in KiB).
    pub download_chunk_kb: usize,
    /// Seconds to wait before retrying a transient feed failure when the
    /// server does not suggest a delay.
    pub transient_retry_secs: u64,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application (client) ID. `None` until configured.
    pub app_id: Option<String>,
    /// Client secret for confidential client registrations.
    pub client_secret: Option<String>,
    /// OAuth scopes to request.
    pub scopes: Vec<String>,
    /// Redirect URI registered for the application.
    pub redirect_uri: String,
}

/// Durable state settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// SQLite database holding the feed cursor and tokens.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/onemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("onemirror")
            .join("config.yaml")
    }

    /// Compiled exclusion pattern, if one is configured.
    pub fn exclusion(&self) -> anyhow::Result<Option<ExclusionPattern>> {
        match self.mirror.exclude.as_deref() {
            Some(pattern) if !pattern.is_empty() => Ok(Some(ExclusionPattern::new(pattern)?)),
            _ => Ok(None),
        }
    }
}

impl MirrorConfig {
    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Default transient-retry delay as a [`Duration`].
    pub fn transient_retry(&self) -> Duration {
        Duration::from_secs(self.transient_retry_secs)
    }

    /// Download chunk size in bytes.
    pub fn download_chunk_bytes(&self) -> usize {
        self.download_chunk_kb * 1024
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            local_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("OneDrive"),
            remote_root: "/".to_string(),
            poll_interval: 30,
            exclude: None,
            download_chunk_kb: 128,
            transient_retry_secs: 20,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            client_secret: None,
            scopes: vec!["Files.Read".to_string(), "offline_access".to_string()],
            redirect_uri: "https://login.microsoftonline.com/common/oauth2/nativeclient"
                .to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("onemirror");
        Self {
            database: data_dir.join("onemirror.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"mirror.poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- mirror ---
        if self.mirror.poll_interval == 0 {
            errors.push(ValidationError {
                field: "mirror.poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.mirror.download_chunk_kb == 0 {
            errors.push(ValidationError {
                field: "mirror.download_chunk_kb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.mirror.transient_retry_secs == 0 {
            errors.push(ValidationError {
                field: "mirror.transient_retry_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if !self.mirror.remote_root.starts_with('/') {
            errors.push(ValidationError {
                field: "mirror.remote_root".into(),
                message: format!("must start with '/': {}", self.mirror.remote_root),
            });
        }
        if self.mirror.local_root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "mirror.local_root".into(),
                message: "must not be empty".into(),
            });
        }
        if let Some(pattern) = self.mirror.exclude.as_deref() {
            if let Err(e) = ExclusionPattern::new(pattern) {
                errors.push(ValidationError {
                    field: "mirror.exclude".into(),
                    message: e.to_string(),
                });
            }
        }

        // --- auth ---
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }
        if url_scheme(&self.auth.redirect_uri).is_none() {
            errors.push(ValidationError {
                field: "auth.redirect_uri".into(),
                message: format!("not an absolute URI: {}", self.auth.redirect_uri),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

fn url_scheme(uri: &str) -> Option<&str> {
    let (scheme, rest) = uri.split_once("://")?;
    (!scheme.is_empty() && !rest.is_empty()).then_some(scheme)
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use onemirror_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .local_root(PathBuf::from("/srv/mirror"))
///     .remote_root("/Documents")
///     .poll_interval(60)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- mirror ---

    pub fn local_root(mut self, root: PathBuf) -> Self {
        self.config.mirror.local_root = root;
        self
    }

    pub fn remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.mirror.remote_root = root.into();
        self
    }

    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.config.mirror.poll_interval = seconds;
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.config.mirror.exclude = Some(pattern.into());
        self
    }

    pub fn download_chunk_kb(mut self, kb: usize) -> Self {
        self.config.mirror.download_chunk_kb = kb;
        self
    }

    pub fn transient_retry_secs(mut self, seconds: u64) -> Self {
        self.config.mirror.transient_retry_secs = seconds;
        self
    }

    // --- auth ---

    pub fn auth_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.auth.app_id = Some(app_id.into());
        self
    }

    pub fn auth_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.client_secret = Some(secret.into());
        self
    }

    // --- state ---

    pub fn database(mut self, path: PathBuf) -> Self {
        self.config.state.database = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
