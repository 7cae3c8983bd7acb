//! Microsoft Graph Delta API
//!
//! Implements the delta query pattern for OneDrive, which returns every item
//! on the first enumeration and only changed items afterwards.
//!
//! ## Delta Query Flow
//!
//! 1. **Initial enumeration**: `GET /me/drive/root/delta` (or
//!    `/me/drive/root:/path:/delta` for a sub-folder)
//! 2. **Follow pages**: every page but the last carries `@odata.nextLink`
//! 3. **Resume point**: the last page carries `@odata.deltaLink`, which is
//!    stored verbatim as the durable cursor
//! 4. **Incremental**: `GET <deltaLink>` returns changes since that point
//!
//! Each call to [`fetch_delta_page`] performs exactly one request; the
//! caller decides how to follow links and how to retry.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use onemirror_core::domain::newtypes::{Cursor, RemoteId};
use onemirror_core::domain::{is_valid_item_name, ChangeRecord, ItemKind};
use onemirror_core::ports::FeedPage;

use crate::client::GraphClient;
use crate::GraphError;

// ============================================================================
// Microsoft Graph API response types (JSON deserialization)
// ============================================================================

/// Raw response from the Microsoft Graph delta API
///
/// See: <https://learn.microsoft.com/en-us/graph/api/driveitem-delta>
#[derive(Debug, Deserialize)]
pub(crate) struct GraphDeltaResponse {
    /// Array of changed drive items
    #[serde(default)]
    value: Vec<GraphDriveItem>,

    /// URL for the next page of results (present when more pages exist)
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,

    /// URL to resume from in the next sync cycle (last page only)
    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// A drive item from a delta or item-metadata response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphDriveItem {
    /// Unique identifier of the item within the drive
    pub(crate) id: String,

    /// Name of the item (filename or folder name)
    #[serde(default)]
    name: String,

    /// Size of the item in bytes
    size: Option<u64>,

    /// Last modified date and time
    last_modified_date_time: Option<DateTime<Utc>>,

    /// Reference to the parent item
    parent_reference: Option<GraphParentReference>,

    /// File facet (present if the item is a file)
    file: Option<serde_json::Value>,

    /// Folder facet (present if the item is a folder)
    folder: Option<serde_json::Value>,

    /// Deleted facet (present if the item has been deleted)
    deleted: Option<serde_json::Value>,

    /// Pre-authenticated, short-lived content URL
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,

    /// Legacy name of the pre-authenticated content URL
    #[serde(rename = "@content.downloadUrl")]
    legacy_download_url: Option<String>,
}

/// Parent reference information for a drive item
#[derive(Debug, Deserialize)]
struct GraphParentReference {
    /// Unique identifier of the parent item
    id: Option<String>,
}

// ============================================================================
// DeltaParser - converts Graph API responses to port-level types
// ============================================================================

/// Parser for converting Microsoft Graph delta responses into [`FeedPage`]s
pub struct DeltaParser;

impl DeltaParser {
    /// Parse a single drive item into a [`ChangeRecord`]
    ///
    /// Returns `Ok(None)` for live items that are neither files nor folders
    /// (OneNote packages and similar) and for live items whose name is not
    /// a usable path component; neither can be mirrored.
    ///
    /// Deleted items often come without a name, a parent or their facets.
    /// Unusable names are cleared so the reconciler falls back to what it
    /// observed earlier in the pass.
    pub(crate) fn parse_item(item: GraphDriveItem) -> Result<Option<ChangeRecord>, GraphError> {
        let id = RemoteId::new(item.id)
            .map_err(|e| GraphError::InvalidResponse(e.to_string()))?;
        let parent_id = item
            .parent_reference
            .and_then(|pr| pr.id)
            .map(RemoteId::new)
            .transpose()
            .map_err(|e| GraphError::InvalidResponse(e.to_string()))?;

        if item.deleted.is_some() {
            // Only an explicit file facet makes it a file; the reconciler
            // checks the local entry type before removing anything.
            let kind = if item.file.is_some() {
                ItemKind::File
            } else {
                ItemKind::Folder
            };
            let name = if is_valid_item_name(&item.name) {
                item.name
            } else {
                debug!(id = %id, name = %item.name, "Deleted item without a usable name");
                String::new()
            };
            return Ok(Some(ChangeRecord {
                id,
                name,
                parent_id,
                kind,
                deleted: true,
                size: None,
                last_modified: None,
                download_handle: None,
            }));
        }

        let kind = if item.folder.is_some() {
            ItemKind::Folder
        } else if item.file.is_some() {
            ItemKind::File
        } else {
            info!(id = %id, name = %item.name, "Skipping item that is neither file nor folder");
            return Ok(None);
        };

        // The drive root is named "root"; a sub-folder root always has a name.
        if !is_valid_item_name(&item.name) {
            warn!(id = %id, name = %item.name, "Skipping item with an unusable name");
            return Ok(None);
        }

        let (size, last_modified, download_handle) = match kind {
            ItemKind::File => (
                Some(item.size.unwrap_or(0)),
                item.last_modified_date_time,
                item.download_url.or(item.legacy_download_url),
            ),
            ItemKind::Folder => (None, item.last_modified_date_time, None),
        };

        Ok(Some(ChangeRecord {
            id,
            name: item.name,
            parent_id,
            kind,
            deleted: false,
            size,
            last_modified,
            download_handle,
        }))
    }

    /// Parse a complete delta response into a [`FeedPage`]
    ///
    /// A page with `@odata.nextLink` continues the pass; a page with only
    /// `@odata.deltaLink` is final and its link is the new resume point.
    pub(crate) fn parse_response(response: GraphDeltaResponse) -> Result<FeedPage, GraphError> {
        let mut records = Vec::with_capacity(response.value.len());
        for item in response.value {
            if let Some(record) = Self::parse_item(item)? {
                records.push(record);
            }
        }

        let (link, is_final) = match (response.next_link, response.delta_link) {
            (Some(next), _) => (next, false),
            (None, Some(delta)) => (delta, true),
            (None, None) => {
                return Err(GraphError::InvalidResponse(
                    "delta page has neither @odata.nextLink nor @odata.deltaLink".to_string(),
                ))
            }
        };
        let cursor = Cursor::new(link).map_err(|e| GraphError::InvalidResponse(e.to_string()))?;

        Ok(FeedPage {
            records,
            next_cursor: Some(cursor),
            is_final,
        })
    }

    /// Extract the `token` query parameter from a delta link
    ///
    /// Only used for display; the full link is what gets stored.
    pub fn extract_delta_token(delta_link: &str) -> Option<String> {
        url::Url::parse(delta_link).ok().and_then(|u| {
            u.query_pairs()
                .find(|(key, _)| key == "token")
                .map(|(_, value)| value.into_owned())
        })
    }
}

// ============================================================================
// Delta query functions
// ============================================================================

/// URL starting a full enumeration of `remote_root`
pub fn initial_delta_url(client: &GraphClient, remote_root: &str) -> Result<String, GraphError> {
    client.drive_item_url(remote_root, Some("delta"))
}

/// Fetches a single page of delta results
///
/// `url` is either [`initial_delta_url`] or a link from a previous page.
/// Graph links are absolute, so they are requested as-is.
pub async fn fetch_delta_page(client: &GraphClient, url: &str) -> Result<FeedPage, GraphError> {
    let raw: GraphDeltaResponse = client.get_json(url).await?;
    let page = DeltaParser::parse_response(raw)?;

    debug!(
        items = page.records.len(),
        is_final = page.is_final,
        "Received delta page"
    );
    Ok(page)
}

// ============================================================================
// Tests
// ============================================================================
