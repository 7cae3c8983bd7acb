//! Local mirror filesystem operations
//!
//! [`MirrorFs`] maps `/`-separated mirror-relative paths onto the local
//! root and performs the idempotent operations the reconciler needs.
//!
//! ## Design Decisions
//!
//! - **Expected outcomes are values**: a missing file on delete, an
//!   existing directory on create and a non-empty directory on removal are
//!   reported through return values, never as errors.
//! - **Staged downloads**: content is streamed into a hidden sibling file
//!   that replaces the target only after the whole stream was written, so a
//!   failed download never leaves a truncated file behind.
//! - **Centisecond mtimes**: local and remote timestamps are compared at
//!   10 ms precision, truncated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use onemirror_core::domain::{ChangeRecord, ItemKind};
use onemirror_core::ports::ChunkSink;

use crate::SyncError;

/// Suffix of in-progress download files
const PARTIAL_SUFFIX: &str = ".onemirror-partial";

/// Timestamp truncated to centiseconds since the Unix epoch
pub fn centiseconds(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis().div_euclid(10)
}

/// Result of removing a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRemoval {
    Removed,
    Absent,
    NotEmpty,
}

/// Result of removing a local-only entry of unknown type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRemoval {
    File,
    Directory,
    Absent,
    NotEmptyDirectory,
}

// ============================================================================
// MirrorFs
// ============================================================================

/// Filesystem operations rooted at the local mirror directory
#[derive(Debug, Clone)]
pub struct MirrorFs {
    root: PathBuf,
}

impl MirrorFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The local mirror directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute local path of a mirror-relative path
    pub fn absolute(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Creates the mirror root (and its parents) if missing
    pub async fn ensure_root(&self) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SyncError::io(&self.root, e))
    }

    /// Kind of the local entry at `relative`, if any
    ///
    /// Symlinks are not followed and count as files, like every other
    /// non-directory entry.
    pub async fn local_kind(&self, relative: &str) -> Result<Option<ItemKind>, SyncError> {
        let path = self.absolute(relative);
        match tokio::fs::symlink_metadata(&path).await {
            Ok(m) if m.is_dir() => Ok(Some(ItemKind::Folder)),
            Ok(_) => Ok(Some(ItemKind::File)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Deletes a file; returns false if it was already absent
    pub async fn remove_file(&self, relative: &str) -> Result<bool, SyncError> {
        let path = self.absolute(relative);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Creates a directory; returns false if it already existed
    pub async fn create_dir(&self, relative: &str) -> Result<bool, SyncError> {
        let path = self.absolute(relative);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    /// Removes an empty directory
    pub async fn remove_dir(&self, relative: &str) -> Result<DirRemoval, SyncError> {
        let path = self.absolute(relative);
        match tokio::fs::remove_dir(&path).await {
            Ok(()) => Ok(DirRemoval::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DirRemoval::Absent),
            Err(e) => {
                if has_entries(&path).await {
                    Ok(DirRemoval::NotEmpty)
                } else {
                    Err(SyncError::io(path, e))
                }
            }
        }
    }

    /// Removes a file, symlink or empty directory
    pub async fn remove_entry(&self, relative: &str) -> Result<EntryRemoval, SyncError> {
        let path = self.absolute(relative);
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(EntryRemoval::Absent),
            Err(e) => return Err(SyncError::io(path, e)),
        };

        if metadata.is_dir() {
            return Ok(match self.remove_dir(relative).await? {
                DirRemoval::Removed => EntryRemoval::Directory,
                DirRemoval::Absent => EntryRemoval::Absent,
                DirRemoval::NotEmpty => EntryRemoval::NotEmptyDirectory,
            });
        }

        Ok(if self.remove_file(relative).await? {
            EntryRemoval::File
        } else {
            EntryRemoval::Absent
        })
    }

    /// Returns true if the local file matches the record's size and mtime
    ///
    /// Records without a size or timestamp are never up to date.
    pub async fn is_up_to_date(
        &self,
        relative: &str,
        record: &ChangeRecord,
    ) -> Result<bool, SyncError> {
        let (Some(size), Some(modified)) = (record.size, record.last_modified) else {
            return Ok(false);
        };

        let path = self.absolute(relative);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        if !metadata.is_file() || metadata.len() != size {
            return Ok(false);
        }

        let local: DateTime<Utc> = metadata
            .modified()
            .map_err(|e| SyncError::io(&path, e))?
            .into();
        Ok(centiseconds(local) == centiseconds(modified))
    }

    /// Opens a staged download for `relative`
    pub async fn stage(&self, relative: &str, chunk_size: usize) -> Result<StagedFile, SyncError> {
        let target = self.absolute(relative);
        let partial = partial_path(&target);
        let file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| SyncError::io(&partial, e))?;

        Ok(StagedFile {
            target,
            partial,
            writer: BufWriter::with_capacity(chunk_size.max(1), file),
        })
    }
}

async fn has_entries(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

// ============================================================================
// StagedFile
// ============================================================================

/// Download in progress; becomes the target file on [`StagedFile::commit`]
pub struct StagedFile {
    target: PathBuf,
    partial: PathBuf,
    writer: BufWriter<tokio::fs::File>,
}

impl StagedFile {
    /// Path the content will be moved to
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flushes, moves the content over the target and applies `modified`
    pub async fn commit(mut self, modified: Option<DateTime<Utc>>) -> Result<(), SyncError> {
        self.writer
            .flush()
            .await
            .map_err(|e| SyncError::io(&self.partial, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| SyncError::io(&self.partial, e))?;
        drop(self.writer);

        tokio::fs::rename(&self.partial, &self.target)
            .await
            .map_err(|e| SyncError::io(&self.target, e))?;

        if let Some(modified) = modified {
            let time = FileTime::from_unix_time(
                modified.timestamp(),
                modified.timestamp_subsec_nanos(),
            );
            filetime::set_file_times(&self.target, time, time)
                .map_err(|e| SyncError::io(&self.target, e))?;
        }
        Ok(())
    }

    /// Discards the partial content
    pub async fn abandon(self) {
        drop(self.writer);
        if let Err(e) = tokio::fs::remove_file(&self.partial).await {
            debug!(path = %self.partial.display(), error = %e, "Could not remove partial download");
        }
    }
}

#[async_trait::async_trait]
impl ChunkSink for StagedFile {
    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(chunk).await
    }
}
