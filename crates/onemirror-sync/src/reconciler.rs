//! Reconciler - one reconciliation pass
//!
//! ## Pass Flow
//!
//! 1. Read the stored cursor. Without one the pass is a full resync and
//!    the local tree is snapshotted first.
//! 2. Consume the feed page by page, applying each record in feed order.
//! 3. Flush deferred directory deletions, deepest first.
//! 4. On a full resync, delete everything the remote snapshot did not mention.
//! 5. Place files that had to wait for a directory in their way to go.
//! 6. Persist the final cursor and commit.
//!
//! If the feed is invalidated at any point the cursor is dropped and the
//! pass starts over as a full resync. An incremental pass that meets a
//! record whose ancestors it cannot resolve does the same.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use onemirror_core::domain::errors::DomainError;
use onemirror_core::domain::newtypes::{Cursor, ExclusionPattern, RemoteId};
use onemirror_core::domain::{ChangeRecord, ItemKind, PathResolver};
use onemirror_core::ports::{FeedError, IChangeFeed, ICursorStore};

use crate::feed_reader::{wait_before_retry, ChangeFeedReader, DEFAULT_TRANSIENT_RETRY};
use crate::filesystem::{EntryRemoval, MirrorFs};
use crate::snapshot::{deepest_first, LocalTreeSnapshot};
use crate::SyncError;

/// Store key holding the durable feed cursor
pub const CURSOR_KEY: &str = "delta_token";

/// Default streamed download chunk (128 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

// ============================================================================
// PassSummary
// ============================================================================

/// Outcome of a completed reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Whether the pass enumerated the whole remote tree
    pub full_resync: bool,
    /// Records consumed from the feed
    pub processed: usize,
    pub files_downloaded: usize,
    pub files_up_to_date: usize,
    pub files_deleted: usize,
    pub dirs_created: usize,
    pub dirs_deleted: usize,
    /// Directories left in place because they still had content
    pub dirs_retained: usize,
    pub excluded: usize,
    /// Local-only entries removed by full-resync cleanup
    pub local_only_deleted: usize,
    /// Records without a usable name or parent
    pub skipped: usize,
}

/// Mutable state owned by a single pass
struct PassState {
    resolver: PathResolver,
    snapshot: Option<LocalTreeSnapshot>,
    deferred: Vec<String>,
    /// Files whose local path is taken by a non-empty directory
    postponed: Vec<(String, ChangeRecord)>,
    /// Path of every live item applied so far, with its id
    placed: HashMap<String, RemoteId>,
    summary: PassSummary,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Applies the remote change feed to the local mirror directory
///
/// ## Dependencies
///
/// - `feed`: paged remote change feed and content download
/// - `store`: durable key/value store holding the cursor under [`CURSOR_KEY`]
pub struct Reconciler {
    feed: Arc<dyn IChangeFeed>,
    store: Arc<dyn ICursorStore>,
    fs: MirrorFs,
    root_id: RemoteId,
    exclude: Option<ExclusionPattern>,
    transient_retry: Duration,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl Reconciler {
    /// Creates a reconciler mirroring the remote folder `root_id` into `local_root`
    pub fn new(
        feed: Arc<dyn IChangeFeed>,
        store: Arc<dyn ICursorStore>,
        local_root: impl Into<PathBuf>,
        root_id: RemoteId,
    ) -> Self {
        Self {
            feed,
            store,
            fs: MirrorFs::new(local_root),
            root_id,
            exclude: None,
            transient_retry: DEFAULT_TRANSIENT_RETRY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Skips records and local entries whose relative path matches `pattern`
    pub fn with_exclusion(mut self, pattern: Option<ExclusionPattern>) -> Self {
        self.exclude = pattern;
        self
    }

    /// Delay before retrying a transient failure that carried no hint
    pub fn with_transient_retry(mut self, delay: Duration) -> Self {
        self.transient_retry = delay;
        self
    }

    /// Buffer size used when streaming downloads to disk
    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    /// Cancels in-flight passes when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn local_root(&self) -> &Path {
        self.fs.root()
    }

    pub fn root_id(&self) -> &RemoteId {
        &self.root_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The durable cursor, if a previous pass completed
    pub async fn stored_cursor(&self) -> Result<Option<Cursor>, SyncError> {
        let stored = self.store.get(CURSOR_KEY).await.map_err(SyncError::Store)?;
        match stored {
            Some(value) if !value.trim().is_empty() => Ok(Some(Cursor::new(value)?)),
            Some(_) => {
                warn!("Ignoring blank stored cursor");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Forgets the cursor so the next pass is a full resync
    pub async fn reset_cursor(&self) -> Result<(), SyncError> {
        self.store.remove(CURSOR_KEY).await.map_err(SyncError::Store)?;
        self.store.commit().await.map_err(SyncError::Store)?;
        Ok(())
    }

    /// Runs one reconciliation pass, restarting as a full resync on invalidation
    ///
    /// # Errors
    /// - [`SyncError::ObjectNotFound`] if the mirrored folder vanished
    /// - [`SyncError::Io`] on unexpected local filesystem failures
    /// - [`SyncError::Cancelled`] if the cancellation token fired
    ///
    /// The cursor is not advanced when an error is returned.
    #[tracing::instrument(skip(self), fields(root = %self.fs.root().display()))]
    pub async fn run_pass(&self) -> Result<PassSummary, SyncError> {
        loop {
            match self.attempt().await {
                Err(SyncError::ResyncRequired) => {
                    warn!("Change feed invalidated, restarting as a full resync");
                    self.reset_cursor().await?;
                }
                other => return other,
            }
        }
    }

    async fn attempt(&self) -> Result<PassSummary, SyncError> {
        let cursor = self.stored_cursor().await?;
        let full_resync = cursor.is_none();
        self.fs.ensure_root().await?;

        let snapshot = if full_resync {
            Some(self.capture_snapshot().await?)
        } else {
            None
        };
        info!(full_resync, "Starting reconciliation pass");

        let mut state = PassState {
            resolver: PathResolver::new(self.root_id.clone()),
            snapshot,
            deferred: Vec::new(),
            postponed: Vec::new(),
            placed: HashMap::new(),
            summary: PassSummary {
                full_resync,
                ..PassSummary::default()
            },
        };

        let mut reader = ChangeFeedReader::new(Arc::clone(&self.feed), cursor)
            .with_default_retry(self.transient_retry)
            .with_cancellation(self.cancel.clone());

        while let Some(page) = reader.next_page().await? {
            for record in &page.records {
                if self.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }
                self.apply(record, &mut state)
                    .await
                    .map_err(|e| fail_closed(e, full_resync))?;
                state.summary.processed += 1;
            }
        }

        self.flush_deferred(std::mem::take(&mut state.deferred), &mut state.summary)
            .await?;
        if let Some(snapshot) = state.snapshot.take() {
            self.remove_local_only(snapshot, &mut state.summary).await?;
        }
        for (path, record) in std::mem::take(&mut state.postponed) {
            if self.make_room(&path, ItemKind::File).await? {
                self.update_file(&record, &path, &mut state.summary).await?;
            } else {
                warn!(path = %path, "Could not replace non-empty directory with a file");
                state.summary.dirs_retained += 1;
            }
        }

        match reader.final_cursor() {
            Some(next) => {
                self.store
                    .set(CURSOR_KEY, next.as_str())
                    .await
                    .map_err(SyncError::Store)?;
                self.store.commit().await.map_err(SyncError::Store)?;
            }
            None => warn!("Feed completed without a resume cursor; cursor left unchanged"),
        }

        let summary = state.summary;
        info!(
            processed = summary.processed,
            downloaded = summary.files_downloaded,
            deleted = summary.files_deleted + summary.dirs_deleted + summary.local_only_deleted,
            full_resync,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }

    async fn capture_snapshot(&self) -> Result<LocalTreeSnapshot, SyncError> {
        let root = self.fs.root().to_path_buf();
        let exclude = self.exclude.clone();
        let walk_root = root.clone();
        tokio::task::spawn_blocking(move || LocalTreeSnapshot::capture(&walk_root, exclude.as_ref()))
            .await
            .map_err(|e| SyncError::io(root, std::io::Error::other(e)))?
    }

    // ========================================================================
    // Per-record state machine
    // ========================================================================

    async fn apply(&self, record: &ChangeRecord, state: &mut PassState) -> Result<(), SyncError> {
        if state.resolver.is_root(&record.id) {
            state
                .resolver
                .observe(record.id.clone(), record.name.clone(), record.parent_id.clone());
            debug!(id = %record.id, "Skipping mirror root record");
            return Ok(());
        }

        let Some((name, parent_id)) = placement(record, &state.resolver) else {
            state.summary.skipped += 1;
            return Ok(());
        };
        state.resolver.observe(record.id.clone(), name, parent_id);
        let path = state.resolver.resolve(&record.id)?;

        if self.exclude.as_ref().is_some_and(|p| p.is_excluded(&path)) {
            debug!(path = %path, "Excluded");
            if let Some(snapshot) = state.snapshot.as_mut() {
                snapshot.discard(&path);
            }
            state.summary.excluded += 1;
            return Ok(());
        }

        if record.deleted {
            if state.placed.get(&path).is_some_and(|owner| owner != &record.id) {
                debug!(path = %path, id = %record.id, "Path already taken by a newer item");
                return Ok(());
            }
        } else {
            if let Some(snapshot) = state.snapshot.as_mut() {
                snapshot.discard(&path);
            }
            // A live item at a path queued for deletion replaces it.
            state.deferred.retain(|queued| queued != &path);
            state.placed.insert(path.clone(), record.id.clone());
        }

        match (record.deleted, record.kind) {
            (true, ItemKind::File) => {
                if self.fs.local_kind(&path).await? == Some(ItemKind::Folder) {
                    debug!(path = %path, "Deleted file is a local directory, queued for deletion");
                    state.deferred.push(path);
                } else if self.fs.remove_file(&path).await? {
                    info!(path = %path, "Deleted file");
                    state.summary.files_deleted += 1;
                } else {
                    debug!(path = %path, "File already absent");
                }
            }
            (true, ItemKind::Folder) => {
                debug!(path = %path, "Queued directory for deletion");
                state.deferred.push(path);
            }
            (false, ItemKind::File) => {
                if self.make_room(&path, ItemKind::File).await? {
                    self.update_file(record, &path, &mut state.summary).await?;
                } else {
                    debug!(path = %path, "Directory in the way, postponing file");
                    state.postponed.push((path, record.clone()));
                }
            }
            (false, ItemKind::Folder) => {
                self.make_room(&path, ItemKind::Folder).await?;
                if self.fs.create_dir(&path).await? {
                    info!(path = %path, "Created directory");
                    state.summary.dirs_created += 1;
                } else {
                    debug!(path = %path, "Directory already exists");
                }
            }
        }
        Ok(())
    }

    /// Removes a local entry of the other kind standing at `path`
    ///
    /// Returns false if that entry is a directory that still has content.
    async fn make_room(&self, path: &str, kind: ItemKind) -> Result<bool, SyncError> {
        match self.fs.local_kind(path).await? {
            Some(local) if local != kind => match self.fs.remove_entry(path).await? {
                EntryRemoval::NotEmptyDirectory => Ok(false),
                _ => {
                    info!(path = %path, was = %local, now = %kind, "Replaced local entry");
                    Ok(true)
                }
            },
            _ => Ok(true),
        }
    }

    async fn update_file(
        &self,
        record: &ChangeRecord,
        path: &str,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        if self.fs.is_up_to_date(path, record).await? {
            debug!(path = %path, "Already up to date");
            summary.files_up_to_date += 1;
        } else {
            let bytes = self.download(record, path).await?;
            info!(path = %path, bytes, "Downloaded file");
            summary.files_downloaded += 1;
        }
        Ok(())
    }

    /// Downloads the whole file, starting over after transient failures
    async fn download(&self, record: &ChangeRecord, path: &str) -> Result<u64, SyncError> {
        loop {
            let mut staged = self.fs.stage(path, self.chunk_size).await?;
            match self.feed.download(record, &mut staged).await {
                Ok(bytes) => {
                    staged.commit(record.last_modified).await?;
                    return Ok(bytes);
                }
                Err(err) => {
                    let target = staged.target().to_path_buf();
                    staged.abandon().await;
                    match err {
                        FeedError::Sink(source) => return Err(SyncError::io(target, source)),
                        err if err.is_transient() => {
                            wait_before_retry("download", &err, self.transient_retry, &self.cancel)
                                .await?;
                        }
                        err => return Err(err.into()),
                    }
                }
            }
        }
    }

    // ========================================================================
    // Flushing and cleanup
    // ========================================================================

    async fn flush_deferred(
        &self,
        mut deferred: Vec<String>,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        deepest_first(&mut deferred);
        deferred.dedup();

        // Failures here are reported but never abort the pass.
        for path in deferred {
            match self.fs.remove_entry(&path).await {
                Ok(EntryRemoval::Directory) => {
                    info!(path = %path, "Deleted directory");
                    summary.dirs_deleted += 1;
                }
                Ok(EntryRemoval::File) => {
                    info!(path = %path, "Deleted file recorded as a folder");
                    summary.files_deleted += 1;
                }
                Ok(EntryRemoval::Absent) => debug!(path = %path, "Directory already absent"),
                Ok(EntryRemoval::NotEmptyDirectory) => {
                    warn!(path = %path, "Could not delete non-empty directory");
                    summary.dirs_retained += 1;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Could not delete directory");
                    summary.dirs_retained += 1;
                }
            }
        }
        Ok(())
    }

    async fn remove_local_only(
        &self,
        snapshot: LocalTreeSnapshot,
        summary: &mut PassSummary,
    ) -> Result<(), SyncError> {
        for path in snapshot.into_deletion_order() {
            match self.fs.remove_entry(&path).await? {
                EntryRemoval::File | EntryRemoval::Directory => {
                    info!(path = %path, "Deleted local-only entry");
                    summary.local_only_deleted += 1;
                }
                EntryRemoval::Absent => debug!(path = %path, "Local-only entry already gone"),
                EntryRemoval::NotEmptyDirectory => {
                    warn!(path = %path, "Could not delete local-only non-empty directory");
                    summary.dirs_retained += 1;
                }
            }
        }
        Ok(())
    }
}

/// Name and parent to file `record` under
///
/// Deleted records often lack both; the values observed earlier in the
/// pass fill the gaps. Returns `None` (after logging) when the record
/// cannot be placed safely.
fn placement(record: &ChangeRecord, resolver: &PathResolver) -> Option<(String, Option<RemoteId>)> {
    let known = if record.deleted {
        resolver.known(&record.id)
    } else {
        None
    };

    let name = if record.has_valid_name() {
        record.name.clone()
    } else if let Some((name, _)) = known {
        name.to_string()
    } else {
        warn!(
            id = %record.id,
            name = %record.name,
            deleted = record.deleted,
            "Skipping record without a usable name"
        );
        return None;
    };

    let parent_id = record
        .parent_id
        .clone()
        .or_else(|| known.and_then(|(_, parent)| parent.cloned()));
    if record.deleted && parent_id.is_none() {
        warn!(id = %record.id, name = %name, "Skipping deleted record without a parent");
        return None;
    }
    Some((name, parent_id))
}

/// Turns an unresolvable ancestor chain into a resync during incremental passes
fn fail_closed(err: SyncError, full_resync: bool) -> SyncError {
    match err {
        SyncError::Domain(DomainError::UnresolvedPath { id, missing }) if !full_resync => {
            warn!(
                id = %id,
                missing = %missing,
                "Ancestor not present in incremental changes, forcing a full resync"
            );
            SyncError::ResyncRequired
        }
        other => other,
    }
}
