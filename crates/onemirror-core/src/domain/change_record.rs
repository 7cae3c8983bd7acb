//! Change records delivered by the remote change feed
//!
//! A [`ChangeRecord`] is the provider-neutral form of one entry of a delta
//! page. It lives only for the duration of one reconciliation pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::RemoteId;

/// Kind of a remote item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    File,
    Folder,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Folder => write!(f, "folder"),
        }
    }
}

/// Returns true if `name` is usable as a single local path component
///
/// Empty names, `.`, `..` and names containing `/` or NUL are rejected.
pub fn is_valid_item_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\0')
}

/// One change observed on the remote feed
///
/// Deleted records carry no content fields: `size`, `last_modified` and
/// `download_handle` are always `None` when `deleted` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Stable identifier of the item
    pub id: RemoteId,
    /// Item name (last path component)
    pub name: String,
    /// Parent folder identifier (`None` for the drive root)
    pub parent_id: Option<RemoteId>,
    /// File or folder
    pub kind: ItemKind,
    /// Whether the item was removed remotely
    pub deleted: bool,
    /// Content size in bytes
    pub size: Option<u64>,
    /// Remote last-modified timestamp
    pub last_modified: Option<DateTime<Utc>>,
    /// Provider-specific handle for fetching content (e.g. a pre-authenticated URL)
    pub download_handle: Option<String>,
}

impl ChangeRecord {
    /// Create a live file record
    pub fn file(
        id: RemoteId,
        name: impl Into<String>,
        parent_id: RemoteId,
        size: u64,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: Some(parent_id),
            kind: ItemKind::File,
            deleted: false,
            size: Some(size),
            last_modified: Some(last_modified),
            download_handle: None,
        }
    }

    /// Create a live folder record
    pub fn folder(id: RemoteId, name: impl Into<String>, parent_id: Option<RemoteId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            kind: ItemKind::Folder,
            deleted: false,
            size: None,
            last_modified: None,
            download_handle: None,
        }
    }

    /// Create a deletion record
    pub fn deleted(
        id: RemoteId,
        name: impl Into<String>,
        parent_id: RemoteId,
        kind: ItemKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: Some(parent_id),
            kind,
            deleted: true,
            size: None,
            last_modified: None,
            download_handle: None,
        }
    }

    /// Attach a download handle
    #[must_use]
    pub fn with_download_handle(mut self, handle: impl Into<String>) -> Self {
        if !self.deleted {
            self.download_handle = Some(handle.into());
        }
        self
    }

    /// Returns true if this is a file record
    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }

    /// Returns true if this is a folder record
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    /// Returns true if the record's name is a usable path component
    pub fn has_valid_name(&self) -> bool {
        is_valid_item_name(&self.name)
    }
}
