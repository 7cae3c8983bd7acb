//! Auth commands - Login and Logout for OneDrive
//!
//! Provides the `onemirror auth` CLI subcommands:
//! 1. `login`  - Prints the authorization URL, reads back the redirect URL
//!    the browser ended on, redeems the code and stores the tokens.
//! 2. `logout` - Deletes the stored tokens.

use anyhow::{Context, Result};
use clap::Subcommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use onemirror_graph::auth::{extract_code, OAuth2Config, PKCEFlow};

use crate::context::{CliContext, State};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Authenticate with OneDrive via OAuth2
    Login {
        /// Application (client) ID, overriding auth.app_id
        #[arg(long)]
        app_id: Option<String>,
    },
    /// Remove stored credentials
    Logout,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            AuthCommand::Login { app_id } => self.execute_login(ctx, app_id.as_deref()).await,
            AuthCommand::Logout => self.execute_logout(ctx).await,
        }
    }

    /// Runs the authorization-code flow with PKCE on the terminal
    async fn execute_login(&self, ctx: &CliContext, cli_app_id: Option<&str>) -> Result<()> {
        let fmt = ctx.formatter();
        let mut config = ctx.load_config()?;
        if let Some(app_id) = cli_app_id {
            config.auth.app_id = Some(app_id.to_string());
        }

        let oauth = OAuth2Config::from_config(&config.auth)
            .context("No app_id provided. Use --app-id or set auth.app_id in config.yaml")?;
        let flow = PKCEFlow::new(&oauth)?;
        let (auth_url, csrf, verifier) = flow.generate_auth_url();

        info!(app_id = %oauth.app_id, "Starting OAuth2 login");
        eprintln!("Open this URL in your browser and sign in:\n\n  {auth_url}\n");
        eprintln!("Then paste the URL you were redirected to:");

        let mut redirect = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut redirect)
            .await
            .context("Failed to read the redirect URL")?;

        let code = extract_code(&redirect, &csrf)?;
        let tokens = flow
            .exchange_code(code, verifier)
            .await
            .context("OAuth2 code exchange failed")?;

        let state = State::open(&config).await?;
        state.token_store().save(&tokens).await?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "logged_in": true,
                "expires_at": tokens.expires_at.to_rfc3339(),
                "refreshable": tokens.refresh_token.is_some(),
            }));
        } else {
            fmt.success("Logged in to OneDrive");
            fmt.info(&format!(
                "Access token valid until {}",
                tokens.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
            if tokens.refresh_token.is_none() {
                fmt.warn("No refresh token granted; request the offline_access scope");
            }
        }
        Ok(())
    }

    async fn execute_logout(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.load_config()?;
        let state = State::open(&config).await?;
        let tokens = state.token_store();

        if tokens.load().await?.is_none() {
            fmt.info("Not logged in. Nothing to do.");
            return Ok(());
        }
        tokens.clear().await?;

        fmt.success("Logged out");
        Ok(())
    }
}
