//! Status command - Show mirror configuration and stored state
//!
//! Reports the configured roots, whether a feed cursor is stored (i.e.
//! whether the next pass is incremental) and the state of the OAuth tokens.

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use onemirror_core::config::Config;
use onemirror_core::ports::{ICursorStore, Tokens};
use onemirror_sync::CURSOR_KEY;

use crate::context::{CliContext, State};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.load_config()?;
        let state = State::open(&config).await?;

        let has_cursor = state.store.get(CURSOR_KEY).await?.is_some();
        let tokens = state.token_store().load().await?;
        state.pool.close().await;

        if ctx.is_json() {
            fmt.print_json(&status_json(&config, has_cursor, tokens.as_ref()));
            return Ok(());
        }

        fmt.success("OneMirror status");
        fmt.info(&format!("Remote folder: {}", config.mirror.remote_root));
        fmt.info(&format!("Local folder:  {}", config.mirror.local_root.display()));
        fmt.info(&format!("Poll interval: {}s", config.mirror.poll_interval));
        if let Some(exclude) = &config.mirror.exclude {
            fmt.info(&format!("Exclude:       {exclude}"));
        }
        fmt.info(&format!("State:         {}", config.state.database.display()));
        fmt.info(if has_cursor {
            "Next pass:     incremental"
        } else {
            "Next pass:     full resync"
        });

        match &tokens {
            None => fmt.warn("Not logged in. Run 'onemirror auth login'."),
            Some(t) if t.is_expired() && t.refresh_token.is_none() => {
                fmt.warn("Access token expired and cannot be refreshed. Log in again.")
            }
            Some(t) => fmt.info(&format!(
                "Token:         {} (expires {})",
                if t.is_expired() { "expired, refreshable" } else { "valid" },
                t.expires_at.format("%Y-%m-%d %H:%M UTC")
            )),
        }
        Ok(())
    }
}

fn status_json(config: &Config, has_cursor: bool, tokens: Option<&Tokens>) -> serde_json::Value {
    serde_json::json!({
        "remote_root": config.mirror.remote_root,
        "local_root": config.mirror.local_root.display().to_string(),
        "poll_interval": config.mirror.poll_interval,
        "exclude": config.mirror.exclude,
        "database": config.state.database.display().to_string(),
        "cursor_stored": has_cursor,
        "logged_in": tokens.is_some(),
        "token_expires_at": tokens.map(|t| t.expires_at.to_rfc3339()),
        "token_expired": tokens.map(|t| t.expires_at <= Utc::now()),
        "refreshable": tokens.map(|t| t.refresh_token.is_some()),
    })
}
