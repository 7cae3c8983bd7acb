//! Run command - Mirror continuously until interrupted
//!
//! Provides the `onemirror run` CLI command. Passes run back to back while
//! the feed reports changes and the configured interval apart otherwise.
//! SIGINT/SIGTERM stop the loop cleanly; the cursor of an interrupted pass
//! is not advanced.

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use onemirror_sync::PollingDriver;

use crate::context::{build_reconciler, shutdown_signal, CliContext, MirrorArgs, State};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub mirror: MirrorArgs,
}

impl RunCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = self.mirror.apply(ctx.load_config()?)?;
        let state = State::open(&config).await?;

        let cancel = CancellationToken::new();
        let signals = tokio::spawn(shutdown_signal(cancel.clone()));

        let reconciler = build_reconciler(&config, &state, cancel).await?;
        fmt.info(&format!(
            "Mirroring {} into {} every {}s (Ctrl+C to stop)",
            config.mirror.remote_root,
            config.mirror.local_root.display(),
            config.mirror.poll_interval
        ));

        let driver = PollingDriver::new(reconciler, config.mirror.poll_interval());
        let result = driver.run().await;
        signals.abort();
        state.pool.close().await;

        let stats = match result {
            Ok(stats) => {
                info!("Mirror stopped gracefully");
                stats
            }
            Err(e) => {
                error!(error = %e, "Mirror exiting with error");
                return Err(e).context("Mirroring stopped");
            }
        };

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "passes": stats.passes,
                "records": stats.records,
                "full_resyncs": stats.full_resyncs,
            }));
        } else {
            fmt.success(&format!(
                "Stopped after {} ({} applied)",
                plural(stats.passes, "pass"),
                plural(stats.records, "change")
            ));
        }
        Ok(())
    }
}
