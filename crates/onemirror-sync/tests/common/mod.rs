//! Shared fixtures for reconciliation tests
//!
//! [`FakeFeed`] replays scripted feed responses and serves file content
//! from memory; [`MemoryStore`] is a staged key/value store with a commit
//! counter.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use onemirror_core::domain::newtypes::{Cursor, ExclusionPattern, RemoteId};
use onemirror_core::domain::{ChangeRecord, ItemKind};
use onemirror_core::ports::{ChunkSink, FeedError, FeedPage, IChangeFeed, ICursorStore};
use onemirror_sync::Reconciler;

pub const ROOT: &str = "root-id";

/// Cursor returned once the scripted responses are exhausted
pub const IDLE_CURSOR: &str = "cursor-idle";

pub fn id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

pub fn cursor(s: &str) -> Cursor {
    Cursor::new(s.to_string()).unwrap()
}

/// Fixed remote modification time used for every file record
pub fn remote_mtime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap() + chrono::Duration::milliseconds(120)
}

pub fn transient(retry_after: Option<Duration>) -> FeedError {
    FeedError::Transient {
        status: Some(503),
        retry_after,
        message: "service unavailable".into(),
    }
}

// ============================================================================
// Records and pages
// ============================================================================

pub fn folder(id_: &str, name: &str, parent: &str) -> ChangeRecord {
    ChangeRecord::folder(id(id_), name, Some(id(parent)))
}

pub fn deleted_file(id_: &str, name: &str, parent: &str) -> ChangeRecord {
    ChangeRecord::deleted(id(id_), name, id(parent), ItemKind::File)
}

pub fn deleted_folder(id_: &str, name: &str, parent: &str) -> ChangeRecord {
    ChangeRecord::deleted(id(id_), name, id(parent), ItemKind::Folder)
}

pub fn root_record() -> ChangeRecord {
    ChangeRecord::folder(id(ROOT), "root", None)
}

/// Final page ending the pass at `next`
pub fn final_page(records: Vec<ChangeRecord>, next: &str) -> FeedPage {
    FeedPage {
        records,
        next_cursor: Some(cursor(next)),
        is_final: true,
    }
}

/// Intermediate page continuing at `next`
pub fn partial_page(records: Vec<ChangeRecord>, next: &str) -> FeedPage {
    FeedPage {
        records,
        next_cursor: Some(cursor(next)),
        is_final: false,
    }
}

// ============================================================================
// FakeFeed
// ============================================================================

#[derive(Default)]
pub struct FakeFeed {
    responses: Mutex<VecDeque<Result<FeedPage, FeedError>>>,
    requested: Mutex<Vec<Option<String>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    download_failures: Mutex<VecDeque<FeedError>>,
    downloads: Mutex<Vec<String>>,
}

impl FakeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for the next `fetch_page` call
    pub fn push(&self, response: Result<FeedPage, FeedError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_page(&self, page: FeedPage) {
        self.push(Ok(page));
    }

    /// Makes the next download fail after writing a partial chunk
    pub fn fail_next_download(&self, err: FeedError) {
        self.download_failures.lock().unwrap().push_back(err);
    }

    /// Builds a live file record and registers its content
    pub fn file(&self, id_: &str, name: &str, parent: &str, content: &[u8]) -> ChangeRecord {
        self.contents
            .lock()
            .unwrap()
            .insert(id_.to_string(), content.to_vec());
        ChangeRecord::file(id(id_), name, id(parent), content.len() as u64, remote_mtime())
            .with_download_handle(format!("https://download.example/{id_}"))
    }

    /// Positions passed to `fetch_page`, as strings
    pub fn requested(&self) -> Vec<Option<String>> {
        self.requested.lock().unwrap().clone()
    }

    /// Ids of successfully downloaded records
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IChangeFeed for FakeFeed {
    async fn resolve_root(&self, _remote_path: &str) -> Result<RemoteId, FeedError> {
        Ok(id(ROOT))
    }

    async fn fetch_page(&self, position: Option<&Cursor>) -> Result<FeedPage, FeedError> {
        self.requested
            .lock()
            .unwrap()
            .push(position.map(|c| c.as_str().to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(final_page(Vec::new(), IDLE_CURSOR)))
    }

    async fn download(
        &self,
        record: &ChangeRecord,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64, FeedError> {
        let failure = self.download_failures.lock().unwrap().pop_front();
        if let Some(err) = failure {
            sink.write_chunk(b"partial garbage").await.map_err(FeedError::Sink)?;
            return Err(err);
        }

        let content = self
            .contents
            .lock()
            .unwrap()
            .get(record.id.as_str())
            .cloned()
            .ok_or_else(|| FeedError::NotFound(record.id.to_string()))?;

        let (head, tail) = content.split_at(content.len() / 2);
        sink.write_chunk(head).await.map_err(FeedError::Sink)?;
        sink.write_chunk(tail).await.map_err(FeedError::Sink)?;

        self.downloads.lock().unwrap().push(record.id.to_string());
        Ok(content.len() as u64)
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    committed: Mutex<HashMap<String, String>>,
    staged: Mutex<HashMap<String, Option<String>>>,
    commits: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store with an already committed cursor
    pub fn with_cursor(value: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .committed
            .lock()
            .unwrap()
            .insert(onemirror_sync::CURSOR_KEY.to_string(), value.to_string());
        Arc::new(store)
    }

    /// Committed cursor value
    pub fn committed_cursor(&self) -> Option<String> {
        self.committed
            .lock()
            .unwrap()
            .get(onemirror_sync::CURSOR_KEY)
            .cloned()
    }

    pub fn commits(&self) -> u32 {
        *self.commits.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ICursorStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        if let Some(value) = self.staged.lock().unwrap().get(key) {
            return Ok(value.clone());
        }
        Ok(self.committed.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.staged
            .lock()
            .unwrap()
            .insert(key.to_string(), Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.staged.lock().unwrap().insert(key.to_string(), None);
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        let staged: Vec<_> = self.staged.lock().unwrap().drain().collect();
        let mut committed = self.committed.lock().unwrap();
        for (key, value) in staged {
            match value {
                Some(value) => committed.insert(key, value),
                None => committed.remove(&key),
            };
        }
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================================
// Reconciler construction and local tree helpers
// ============================================================================

pub fn reconciler(feed: &Arc<FakeFeed>, store: &Arc<MemoryStore>, root: &Path) -> Reconciler {
    Reconciler::new(feed.clone(), store.clone(), root, id(ROOT))
        .with_transient_retry(Duration::from_secs(20))
        .with_chunk_size(8)
}

pub fn reconciler_excluding(
    feed: &Arc<FakeFeed>,
    store: &Arc<MemoryStore>,
    root: &Path,
    pattern: &str,
) -> Reconciler {
    reconciler(feed, store, root).with_exclusion(Some(ExclusionPattern::new(pattern).unwrap()))
}

pub fn cancelled_reconciler(
    feed: &Arc<FakeFeed>,
    store: &Arc<MemoryStore>,
    root: &Path,
) -> (Reconciler, CancellationToken) {
    let cancel = CancellationToken::new();
    let reconciler = reconciler(feed, store, root).with_cancellation(cancel.clone());
    (reconciler, cancel)
}

pub fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Sets a local file's mtime to [`remote_mtime`]
pub fn touch_remote_mtime(root: &Path, relative: &str) {
    let ts = remote_mtime();
    let time = filetime::FileTime::from_unix_time(ts.timestamp(), ts.timestamp_subsec_nanos());
    filetime::set_file_mtime(root.join(relative), time).unwrap();
}

pub fn read(root: &Path, relative: &str) -> Vec<u8> {
    std::fs::read(root.join(relative)).unwrap()
}
