//! PollingDriver - runs reconciliation passes until cancelled
//!
//! A pass that processed records is followed immediately by another, since
//! more changes may be pending. A pass that processed nothing is followed
//! by the configured idle interval.

use std::time::Duration;

use tracing::{debug, info};

use crate::reconciler::{PassSummary, Reconciler};
use crate::SyncError;

/// Totals accumulated over the lifetime of a driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub passes: usize,
    pub records: usize,
    pub full_resyncs: usize,
}

impl DriverStats {
    fn record(&mut self, summary: &PassSummary) {
        self.passes += 1;
        self.records += summary.processed;
        if summary.full_resync {
            self.full_resyncs += 1;
        }
    }
}

/// Repeatedly invokes a [`Reconciler`]
pub struct PollingDriver {
    reconciler: Reconciler,
    interval: Duration,
}

impl PollingDriver {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Runs until the reconciler's cancellation token fires
    ///
    /// Cancellation is a clean stop and returns the accumulated stats.
    ///
    /// # Errors
    /// Any fatal pass error (missing remote root, unexpected local I/O,
    /// store failure) stops the loop and is returned.
    #[tracing::instrument(skip(self), fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(&self) -> Result<DriverStats, SyncError> {
        let cancel = self.reconciler.cancellation_token().clone();
        let mut stats = DriverStats::default();
        info!("Polling started");

        while !cancel.is_cancelled() {
            let summary = match self.reconciler.run_pass().await {
                Ok(summary) => summary,
                Err(SyncError::Cancelled) => break,
                Err(e) => return Err(e),
            };
            stats.record(&summary);

            if summary.processed > 0 {
                continue;
            }

            debug!(secs = self.interval.as_secs(), "No changes, sleeping");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(passes = stats.passes, records = stats.records, "Polling stopped");
        Ok(stats)
    }
}
