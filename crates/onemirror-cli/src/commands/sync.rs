//! Sync command - Run one reconciliation pass
//!
//! Provides the `onemirror sync` CLI command which:
//! 1. Loads configuration and applies command-line overrides
//! 2. Opens the state database and resolves the remote root
//! 3. Runs a single pass (a full resync with `--full`)
//! 4. Displays what changed locally

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use onemirror_sync::PassSummary;

use crate::context::{build_reconciler, shutdown_signal, CliContext, MirrorArgs, State};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Forget the stored cursor and run a full resync
    #[arg(long)]
    pub full: bool,

    #[command(flatten)]
    pub mirror: MirrorArgs,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = self.mirror.apply(ctx.load_config()?)?;
        let state = State::open(&config).await?;

        let cancel = CancellationToken::new();
        let signals = tokio::spawn(shutdown_signal(cancel.clone()));

        let reconciler = build_reconciler(&config, &state, cancel).await?;
        if self.full {
            fmt.info("Full resync requested - forgetting stored cursor");
            reconciler.reset_cursor().await?;
        }

        fmt.info(&format!(
            "Mirroring {} into {}",
            config.mirror.remote_root,
            config.mirror.local_root.display()
        ));
        let started = Instant::now();
        let summary = reconciler.run_pass().await.context("Synchronization failed")?;
        let elapsed = started.elapsed();
        signals.abort();
        state.pool.close().await;

        if ctx.is_json() {
            fmt.print_json(&summary_json(&summary, elapsed.as_millis() as u64));
        } else {
            print_summary(&*fmt, &summary, elapsed.as_secs_f64());
        }
        Ok(())
    }
}

pub fn summary_json(summary: &PassSummary, duration_ms: u64) -> serde_json::Value {
    serde_json::json!({
        "full_resync": summary.full_resync,
        "processed": summary.processed,
        "files_downloaded": summary.files_downloaded,
        "files_up_to_date": summary.files_up_to_date,
        "files_deleted": summary.files_deleted,
        "dirs_created": summary.dirs_created,
        "dirs_deleted": summary.dirs_deleted,
        "dirs_retained": summary.dirs_retained,
        "excluded": summary.excluded,
        "local_only_deleted": summary.local_only_deleted,
        "skipped": summary.skipped,
        "duration_ms": duration_ms,
    })
}

fn print_summary(fmt: &dyn crate::output::OutputFormatter, summary: &PassSummary, secs: f64) {
    if summary.processed == 0 {
        fmt.success("Already up to date");
        return;
    }

    let kind = if summary.full_resync { "Full resync" } else { "Sync" };
    fmt.success(&format!(
        "{kind} applied {} in {secs:.1}s",
        plural(summary.processed, "change")
    ));

    let lines = [
        ("Downloaded", summary.files_downloaded, "file"),
        ("Up to date", summary.files_up_to_date, "file"),
        ("Deleted", summary.files_deleted, "file"),
        ("Created", summary.dirs_created, "directory"),
        ("Removed", summary.dirs_deleted, "directory"),
        ("Local-only removed", summary.local_only_deleted, "entry"),
        ("Excluded", summary.excluded, "item"),
    ];
    for (label, count, noun) in lines {
        if count > 0 {
            fmt.info(&format!("{label}: {}", plural(count, noun)));
        }
    }
    if summary.skipped > 0 {
        fmt.warn(&format!(
            "{} ignored because they had no usable name or parent",
            plural(summary.skipped, "record")
        ));
    }
    if summary.dirs_retained > 0 {
        fmt.warn(&format!(
            "{} kept because they still contain files",
            plural(summary.dirs_retained, "directory")
        ));
    }
}
