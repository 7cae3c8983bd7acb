//! Config command - View and check the OneMirror configuration
//!
//! Provides the `onemirror config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), secrets redacted
//! 2. Validates the configuration file and reports every problem found

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::info;

use onemirror_core::config::Config;

use crate::context::CliContext;

const REDACTED: &str = "<redacted>";

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx),
            ConfigCommand::Validate => execute_validate(ctx),
        }
    }
}

fn execute_show(ctx: &CliContext) -> Result<()> {
    let fmt = ctx.formatter();
    let config = redacted(ctx.load_config()?);

    info!(config_path = %ctx.config_path.display(), "Showing configuration");

    if ctx.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        fmt.print_json(&json);
        return Ok(());
    }

    fmt.success(&format!("Configuration ({})", ctx.config_path.display()));
    if !ctx.config_path.exists() {
        fmt.info("(file not found, showing defaults)");
    }
    fmt.info("");
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        fmt.info(line);
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext) -> Result<()> {
    let fmt = ctx.formatter();
    let config = ctx.load_config()?;
    let errors = config.validate();

    if ctx.is_json() {
        let messages: Vec<serde_json::Value> = errors
            .iter()
            .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
            .collect();
        fmt.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "path": ctx.config_path.display().to_string(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        fmt.success(&format!("Configuration is valid ({})", ctx.config_path.display()));
    } else {
        for e in &errors {
            fmt.error(&e.to_string());
        }
    }

    if !errors.is_empty() {
        bail!("{} configuration error(s)", errors.len());
    }
    Ok(())
}

fn redacted(mut config: Config) -> Config {
    if config.auth.client_secret.is_some() {
        config.auth.client_secret = Some(REDACTED.to_string());
    }
    config
}
