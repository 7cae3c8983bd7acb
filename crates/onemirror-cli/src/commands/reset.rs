//! Reset command - Forget the feed cursor
//!
//! The next `sync` or `run` pass enumerates the whole remote folder and
//! removes local entries the remote no longer has.

use anyhow::Result;
use clap::Args;

use onemirror_core::ports::ICursorStore;
use onemirror_sync::CURSOR_KEY;

use crate::context::{CliContext, State};

#[derive(Debug, Args)]
pub struct ResetCommand {}

impl ResetCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let fmt = ctx.formatter();
        let config = ctx.load_config()?;
        let state = State::open(&config).await?;

        let had_cursor = state.store.get(CURSOR_KEY).await?.is_some();
        state.store.remove(CURSOR_KEY).await?;
        state.store.commit().await?;
        state.pool.close().await;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({ "reset": had_cursor }));
        } else if had_cursor {
            fmt.success("Cursor cleared; the next pass will be a full resync");
        } else {
            fmt.success("No cursor stored; the next pass is already a full resync");
        }
        Ok(())
    }
}
