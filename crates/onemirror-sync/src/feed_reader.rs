//! ChangeFeedReader - restartable page sequence over an [`IChangeFeed`]
//!
//! The reader owns the position within one pass. Each call to
//! [`ChangeFeedReader::next_page`] performs one page fetch, retrying the
//! same position after transient failures for as long as it takes. The
//! loop is explicit so long failure streaks never grow the stack.
//!
//! Invalidation and missing objects are not retried; they surface as
//! [`SyncError::ResyncRequired`] and [`SyncError::ObjectNotFound`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use onemirror_core::domain::newtypes::{Cursor, RemoteId};
use onemirror_core::ports::{FeedError, FeedPage, IChangeFeed};

use crate::SyncError;

/// Delay used when the server does not suggest one
pub const DEFAULT_TRANSIENT_RETRY: Duration = Duration::from_secs(20);

/// Pulls the pages of one pass in order
pub struct ChangeFeedReader {
    feed: Arc<dyn IChangeFeed>,
    /// Position of the next fetch; `None` starts a full enumeration
    position: Option<Cursor>,
    full_enumeration: bool,
    /// Resume point delivered by the final page
    final_cursor: Option<Cursor>,
    done: bool,
    default_retry: Duration,
    cancel: CancellationToken,
}

impl ChangeFeedReader {
    /// Creates a reader starting at `start` (`None` for a full enumeration)
    pub fn new(feed: Arc<dyn IChangeFeed>, start: Option<Cursor>) -> Self {
        Self {
            feed,
            full_enumeration: start.is_none(),
            position: start,
            final_cursor: None,
            done: false,
            default_retry: DEFAULT_TRANSIENT_RETRY,
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the delay used when a transient failure carries no hint
    pub fn with_default_retry(mut self, delay: Duration) -> Self {
        self.default_retry = delay;
        self
    }

    /// Stops retry sleeps when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns true if this pass enumerates the whole remote tree
    pub fn is_full_enumeration(&self) -> bool {
        self.full_enumeration
    }

    /// The durable resume point, available once the final page was read
    pub fn final_cursor(&self) -> Option<&Cursor> {
        self.final_cursor.as_ref()
    }

    /// Fetches the next page, or `None` once the final page was returned
    ///
    /// # Errors
    /// - [`SyncError::ResyncRequired`] if the feed rejected the position
    /// - [`SyncError::ObjectNotFound`] if the mirrored folder is gone
    /// - [`SyncError::Cancelled`] if cancelled while waiting to retry
    pub async fn next_page(&mut self) -> Result<Option<FeedPage>, SyncError> {
        if self.done {
            return Ok(None);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let err = match self.feed.fetch_page(self.position.as_ref()).await {
                Ok(page) => {
                    self.advance(&page)?;
                    debug!(
                        records = page.records.len(),
                        is_final = page.is_final,
                        "Fetched change feed page"
                    );
                    return Ok(Some(page));
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err.into());
            }
            wait_before_retry("fetch_page", &err, self.default_retry, &self.cancel).await?;
        }
    }

    fn advance(&mut self, page: &FeedPage) -> Result<(), SyncError> {
        if page.is_final {
            self.done = true;
            self.final_cursor = page.next_cursor.clone();
            if self.final_cursor.is_none() {
                warn!("Final page carried no resume cursor");
            }
            return Ok(());
        }

        match &page.next_cursor {
            Some(next) => {
                self.position = Some(next.clone());
                Ok(())
            }
            None => Err(SyncError::Feed(FeedError::Other(anyhow::anyhow!(
                "non-final page without a next cursor"
            )))),
        }
    }
}

/// Resolves the configured remote root to its id, retrying transient failures
///
/// # Errors
/// [`SyncError::ObjectNotFound`] if the path does not exist remotely
pub async fn resolve_mirror_root(
    feed: &dyn IChangeFeed,
    remote_root: &str,
    default_retry: Duration,
    cancel: &CancellationToken,
) -> Result<RemoteId, SyncError> {
    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match feed.resolve_root(remote_root).await {
            Ok(id) => return Ok(id),
            Err(err) if err.is_transient() => {
                wait_before_retry("resolve_root", &err, default_retry, cancel).await?;
            }
            Err(FeedError::NotFound(_)) => {
                return Err(SyncError::ObjectNotFound(remote_root.to_string()))
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Sleeps for the server-suggested delay (or `default`) after a transient failure
pub(crate) async fn wait_before_retry(
    operation: &str,
    err: &FeedError,
    default: Duration,
    cancel: &CancellationToken,
) -> Result<(), SyncError> {
    let (status, hint) = match err {
        FeedError::Transient {
            status,
            retry_after,
            ..
        } => (*status, *retry_after),
        _ => (None, None),
    };
    let delay = hint.unwrap_or(default);

    warn!(
        operation,
        status = ?status,
        delay_secs = delay.as_secs_f64(),
        error = %err,
        "Transient failure, retrying"
    );

    tokio::select! {
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
