//! OneMirror CLI - Mirror a OneDrive folder into a local directory
//!
//! Provides commands for:
//! - Authentication with OneDrive
//! - Running a single reconciliation pass or mirroring continuously
//! - Inspecting and resetting the stored mirror state
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    auth::AuthCommand, completions::CompletionsCommand, config::ConfigCommand,
    reset::ResetCommand, run::RunCommand, status::StatusCommand, sync::SyncCommand,
};
use context::CliContext;
use onemirror_core::config::Config;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "onemirror",
    version,
    about = "One-way mirror of a OneDrive folder into a local directory"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Run one reconciliation pass
    Sync(SyncCommand),
    /// Mirror continuously until interrupted
    Run(RunCommand),
    /// Show mirror configuration and stored state
    Status(StatusCommand),
    /// Forget the feed cursor so the next pass is a full resync
    Reset(ResetCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

fn log_filter(verbose: u8, config: &Config) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, &Config::load_or_default(&config_path)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CliContext {
        config_path,
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Run(cmd) => cmd.execute(&ctx).await,
        Commands::Status(cmd) => cmd.execute(&ctx).await,
        Commands::Reset(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}
