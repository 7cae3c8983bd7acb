//! Shared command wiring
//!
//! Loads configuration, opens the state database and assembles the Graph
//! change feed and reconciler the way every command needs them.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use onemirror_cache::{DatabasePool, SqliteKeyValueStore};
use onemirror_core::config::{Config, ConfigBuilder};
use onemirror_core::ports::{IChangeFeed, ICursorStore};
use onemirror_graph::auth::{OAuth2Config, PKCEFlow, StoredTokenSource, TokenStore};
use onemirror_graph::client::GraphClient;
use onemirror_graph::provider::GraphChangeFeed;
use onemirror_sync::feed_reader::resolve_mirror_root;
use onemirror_sync::Reconciler;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command receives
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl CliContext {
    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format, self.quiet)
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Loads the configuration file, or defaults when it does not exist
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        Config::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }
}

// ============================================================================
// Mirror overrides
// ============================================================================

/// Command-line overrides of the `mirror` config section
#[derive(Debug, Clone, Default, Args)]
pub struct MirrorArgs {
    /// Local mirror directory
    #[arg(long, value_name = "DIR")]
    pub local: Option<PathBuf>,

    /// Remote folder to mirror (e.g. "/Documents")
    #[arg(long, value_name = "PATH")]
    pub remote: Option<String>,

    /// Regular expression of relative paths to skip
    #[arg(long, value_name = "REGEX")]
    pub exclude: Option<String>,

    /// Seconds to wait after a pass without changes
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,
}

impl MirrorArgs {
    /// Applies the overrides and validates the result
    pub fn apply(&self, config: Config) -> Result<Config> {
        let mut builder = ConfigBuilder::from_config(config);
        if let Some(local) = &self.local {
            builder = builder.local_root(local.clone());
        }
        if let Some(remote) = &self.remote {
            builder = builder.remote_root(remote.clone());
        }
        if let Some(exclude) = &self.exclude {
            builder = builder.exclude(exclude.clone());
        }
        if let Some(interval) = self.interval {
            builder = builder.poll_interval(interval);
        }

        builder.build_validated().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow!("Invalid configuration: {}", messages.join("; "))
        })
    }
}

// ============================================================================
// State and adapters
// ============================================================================

/// Opened state database
pub struct State {
    pub pool: DatabasePool,
    pub store: Arc<SqliteKeyValueStore>,
}

impl State {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = DatabasePool::new(&config.state.database)
            .await
            .context("Failed to open state database")?;
        let store = Arc::new(SqliteKeyValueStore::new(pool.pool().clone()));
        Ok(Self { pool, store })
    }

    pub fn token_store(&self) -> TokenStore {
        TokenStore::new(self.store.clone() as Arc<dyn ICursorStore>)
    }
}

/// Builds the Graph change feed authenticated with the stored tokens
pub fn graph_feed(config: &Config, state: &State) -> Result<GraphChangeFeed> {
    let oauth = OAuth2Config::from_config(&config.auth)?;
    let flow = PKCEFlow::new(&oauth)?;
    let tokens = StoredTokenSource::new(flow, state.token_store());
    let client = GraphClient::new(Arc::new(tokens));
    Ok(GraphChangeFeed::new(client, config.mirror.remote_root.clone()))
}

/// Resolves the remote root and builds a reconciler for `config`
pub async fn build_reconciler(
    config: &Config,
    state: &State,
    cancel: CancellationToken,
) -> Result<Reconciler> {
    let feed: Arc<dyn IChangeFeed> = Arc::new(graph_feed(config, state)?);
    let mirror = &config.mirror;

    let root_id = resolve_mirror_root(
        feed.as_ref(),
        &mirror.remote_root,
        mirror.transient_retry(),
        &cancel,
    )
    .await
    .with_context(|| format!("Cannot resolve remote folder {}", mirror.remote_root))?;
    info!(remote_root = %mirror.remote_root, id = %root_id, "Resolved remote root");

    Ok(Reconciler::new(feed, state.store.clone(), mirror.local_root.clone(), root_id)
        .with_exclusion(config.exclusion()?)
        .with_transient_retry(mirror.transient_retry())
        .with_chunk_size(mirror.download_chunk_bytes())
        .with_cancellation(cancel))
}

/// Cancels `token` on SIGINT or SIGTERM
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}
