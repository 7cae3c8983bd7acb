//! LocalTreeSnapshot - local paths present before a full resync
//!
//! The snapshot is taken once at the start of a full-resync pass. Every
//! remote file or folder processed during the pass is discarded from it, so
//! whatever remains at the end exists only locally and is deleted.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use onemirror_core::domain::newtypes::ExclusionPattern;

use crate::SyncError;

/// Set of `/`-separated paths relative to the mirror root
#[derive(Debug, Default, Clone)]
pub struct LocalTreeSnapshot {
    paths: HashSet<String>,
}

impl LocalTreeSnapshot {
    /// Walks `root` and records every file, directory and symlink below it
    ///
    /// Entries whose relative path matches `exclude` are left out. A missing
    /// root yields an empty snapshot. Symlinks are recorded but not followed.
    ///
    /// # Errors
    /// [`SyncError::Io`] if part of the tree cannot be read
    pub fn capture(root: &Path, exclude: Option<&ExclusionPattern>) -> Result<Self, SyncError> {
        let mut paths = HashSet::new();
        if !root.exists() {
            return Ok(Self { paths });
        }

        for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                SyncError::io(path, std::io::Error::from(e))
            })?;

            let Some(relative) = relative_path(root, entry.path()) else {
                warn!(path = %entry.path().display(), "Skipping entry with a non UTF-8 name");
                continue;
            };
            if exclude.is_some_and(|p| p.is_excluded(&relative)) {
                debug!(path = %relative, "Excluded from snapshot");
                continue;
            }
            paths.insert(relative);
        }

        debug!(entries = paths.len(), root = %root.display(), "Captured local tree");
        Ok(Self { paths })
    }

    /// Builds a snapshot from known relative paths
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Marks `path` as present remotely; returns true if it was tracked
    pub fn discard(&mut self, path: &str) -> bool {
        self.paths.remove(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remaining paths, longest first so children precede their parents
    pub fn into_deletion_order(self) -> Vec<String> {
        let mut paths: Vec<String> = self.paths.into_iter().collect();
        deepest_first(&mut paths);
        paths
    }
}

/// Sorts by descending length, ties broken by reverse lexical order
pub(crate) fn deepest_first(paths: &mut [String]) {
    paths.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| b.cmp(a)));
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
