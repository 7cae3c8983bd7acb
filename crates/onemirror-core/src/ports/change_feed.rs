//! Change feed port (driven/secondary port)
//!
//! This module defines the interface to a remote store that exposes a
//! paged, cursor-based change feed. The primary implementation targets
//! Microsoft OneDrive via the Graph `delta` API.
//!
//! ## Design Notes
//!
//! - Unlike the other ports this one returns a typed [`FeedError`]: the
//!   engine must tell feed invalidation, transient failures and missing
//!   objects apart, and each is handled differently.
//! - Content is pushed into a [`ChunkSink`] chunk by chunk so that memory
//!   use stays bounded regardless of file size.

use std::time::Duration;

use thiserror::Error;

use crate::domain::change_record::ChangeRecord;
use crate::domain::newtypes::{Cursor, RemoteId};

// ============================================================================
// FeedPage
// ============================================================================

/// One page of the change feed
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// Records in feed order
    pub records: Vec<ChangeRecord>,
    /// Position to continue from
    ///
    /// When `is_final` is false this points at the next page of the current
    /// pass. When `is_final` is true it is the new durable resume point.
    pub next_cursor: Option<Cursor>,
    /// Whether this page completes the pass
    pub is_final: bool,
}

// ============================================================================
// FeedError
// ============================================================================

/// Failure modes of the change feed
#[derive(Debug, Error)]
pub enum FeedError {
    /// The remote rejected the cursor; a new full enumeration is required
    #[error("Change feed invalidated, full resync required")]
    Invalidated,

    /// Non-success response without an invalidation signal, or a network failure
    #[error("Transient feed failure (status {status:?}): {message}")]
    Transient {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Server-suggested delay before retrying
        retry_after: Option<Duration>,
        /// Description of the failure
        message: String,
    },

    /// The requested object does not exist remotely
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Writing downloaded content locally failed
    #[error("Failed to write content: {0}")]
    Sink(#[source] std::io::Error),

    /// Any other adapter failure (malformed response, authentication, ...)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FeedError {
    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

// ============================================================================
// ChunkSink
// ============================================================================

/// Destination for streamed content
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    /// Append one chunk of content
    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()>;
}

#[async_trait::async_trait]
impl ChunkSink for Vec<u8> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

// ============================================================================
// IChangeFeed trait
// ============================================================================

/// Port trait for the remote change feed
///
/// ## Implementation Notes
///
/// - `fetch_page` performs exactly one request. Retrying transient failures
///   is the caller's responsibility, so implementations must not loop.
/// - All methods assume valid authentication; token refresh is handled by
///   the implementation.
#[async_trait::async_trait]
pub trait IChangeFeed: Send + Sync {
    /// Resolves a remote path (e.g. `/` or `/Documents`) to its stable id
    ///
    /// # Errors
    /// [`FeedError::NotFound`] if the path does not exist
    async fn resolve_root(&self, remote_path: &str) -> Result<RemoteId, FeedError>;

    /// Fetches one page of the change feed
    ///
    /// `position` is `None` to begin a full enumeration, or a cursor taken
    /// from a previous [`FeedPage::next_cursor`].
    async fn fetch_page(&self, position: Option<&Cursor>) -> Result<FeedPage, FeedError>;

    /// Streams the content of a file record into `sink`
    ///
    /// # Returns
    /// The number of bytes written
    async fn download(
        &self,
        record: &ChangeRecord,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = FeedError::Transient {
            status: Some(503),
            retry_after: Some(Duration::from_secs(5)),
            message: "Service Unavailable".to_string(),
        };
        assert!(err.is_transient());
        assert!(!FeedError::Invalidated.is_transient());
        assert!(!FeedError::NotFound("/x".to_string()).is_transient());
    }

    #[test]
    fn test_display() {
        let err = FeedError::Transient {
            status: Some(500),
            retry_after: None,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Transient feed failure (status Some(500)): boom");
    }

    #[tokio::test]
    async fn test_vec_sink_collects_chunks() {
        let mut sink: Vec<u8> = Vec::new();
        sink.write_chunk(b"hello ").await.unwrap();
        sink.write_chunk(b"world").await.unwrap();
        assert_eq!(sink, b"hello world");
    }
}
