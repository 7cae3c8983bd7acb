//! OneMirror Sync - Reconciliation engine
//!
//! Mirrors a remote change feed onto a local directory tree:
//! - Paged feed consumption with transient-failure retry
//! - Per-pass id→path resolution
//! - Deferred, deepest-first directory deletion
//! - Full resync with local-only cleanup after feed invalidation
//!
//! ## Modules
//!
//! - [`feed_reader`] - Restartable page sequence over an `IChangeFeed`
//! - [`snapshot`] - Local tree enumeration for full-resync cleanup
//! - [`filesystem`] - Idempotent local mirror operations and staged downloads
//! - [`reconciler`] - One reconciliation pass
//! - [`driver`] - Repeated passes with an idle interval

pub mod driver;
pub mod feed_reader;
pub mod filesystem;
pub mod reconciler;
pub mod snapshot;

use std::path::PathBuf;

use onemirror_core::domain::errors::DomainError;
use onemirror_core::ports::FeedError;
use thiserror::Error;

pub use driver::PollingDriver;
pub use feed_reader::ChangeFeedReader;
pub use reconciler::{PassSummary, Reconciler, CURSOR_KEY};
pub use snapshot::LocalTreeSnapshot;

/// Errors that can occur during reconciliation
#[derive(Debug, Error)]
pub enum SyncError {
    /// The mirror root or a requested object vanished without a delete record
    #[error("Remote object not found: {0}")]
    ObjectNotFound(String),

    /// The feed rejected the cursor; the pass must restart as a full resync
    #[error("Change feed invalidated, full resync required")]
    ResyncRequired,

    /// Non-retryable change feed failure
    #[error("Change feed error: {0}")]
    Feed(#[source] FeedError),

    /// Unexpected local filesystem failure
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// The local path being operated on
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// A domain-level error propagated from onemirror-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The cursor store failed
    #[error("State store error: {0:#}")]
    Store(#[source] anyhow::Error),

    /// The pass was stopped through its cancellation token
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Builds an [`SyncError::Io`] for `path`
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<FeedError> for SyncError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Invalidated => Self::ResyncRequired,
            FeedError::NotFound(what) => Self::ObjectNotFound(what),
            other => Self::Feed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidated_maps_to_resync() {
        assert!(matches!(
            SyncError::from(FeedError::Invalidated),
            SyncError::ResyncRequired
        ));
    }

    #[test]
    fn test_not_found_maps_to_object_not_found() {
        match SyncError::from(FeedError::NotFound("/Documents".into())) {
            SyncError::ObjectNotFound(what) => assert_eq!(what, "/Documents"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_feed_errors_are_kept() {
        let err = SyncError::from(FeedError::Other(anyhow::anyhow!("bad json")));
        assert!(matches!(err, SyncError::Feed(FeedError::Other(_))));
    }

    #[test]
    fn test_io_error_display_includes_path() {
        let err = SyncError::io(
            "/mirror/a.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "IO error at /mirror/a.txt: denied");
    }
}
