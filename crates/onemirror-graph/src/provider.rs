//! GraphChangeFeed - IChangeFeed implementation for Microsoft Graph API
//!
//! Wraps the [`GraphClient`] and delegates to the delta module to fulfil
//! the [`IChangeFeed`] port contract.
//!
//! ## Design Notes
//!
//! - The remote root path is fixed at construction; a `None` position
//!   starts a full enumeration of that folder.
//! - Cursors are absolute Graph links and are requested verbatim.
//! - Downloads prefer the pre-authenticated URL carried by the record and
//!   fall back to `/me/drive/items/{id}/content` when it is missing or
//!   rejected (the URL is short-lived).

use futures_util::StreamExt;
use tracing::{debug, warn};

use onemirror_core::domain::newtypes::{Cursor, RemoteId};
use onemirror_core::domain::ChangeRecord;
use onemirror_core::ports::{ChunkSink, FeedError, FeedPage, IChangeFeed};

use crate::client::GraphClient;
use crate::delta::{self, GraphDriveItem};
use crate::GraphError;

/// Change feed over a OneDrive folder
pub struct GraphChangeFeed {
    client: GraphClient,
    remote_root: String,
}

impl GraphChangeFeed {
    /// Creates a change feed for `remote_root` (`/` for the whole drive)
    pub fn new(client: GraphClient, remote_root: impl Into<String>) -> Self {
        Self {
            client,
            remote_root: remote_root.into(),
        }
    }

    /// The mirrored remote folder
    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    /// Returns a reference to the underlying client
    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn content_response(&self, record: &ChangeRecord) -> Result<reqwest::Response, GraphError> {
        if let Some(handle) = &record.download_handle {
            match self.client.get_anonymous(handle).await {
                Ok(response) => return Ok(response),
                Err(GraphError::Status { status, .. }) => {
                    warn!(
                        id = %record.id,
                        status,
                        "Download URL rejected, falling back to content endpoint"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let url = self
            .client
            .api_url(&format!("/me/drive/items/{}/content", record.id.as_str()));
        self.client.get(&url).await
    }
}

#[async_trait::async_trait]
impl IChangeFeed for GraphChangeFeed {
    async fn resolve_root(&self, remote_path: &str) -> Result<RemoteId, FeedError> {
        let url = self.client.drive_item_url(remote_path, None)?;
        let item: GraphDriveItem = match self.client.get_json(&url).await {
            Err(GraphError::NotFound(_)) => {
                return Err(FeedError::NotFound(remote_path.to_string()))
            }
            other => other?,
        };
        debug!(remote_path, id = %item.id, "Resolved remote root");
        RemoteId::new(item.id).map_err(|e| FeedError::Other(e.into()))
    }

    async fn fetch_page(&self, position: Option<&Cursor>) -> Result<FeedPage, FeedError> {
        let url = match position {
            Some(cursor) => cursor.as_str().to_string(),
            None => delta::initial_delta_url(&self.client, &self.remote_root)?,
        };
        Ok(delta::fetch_delta_page(&self.client, &url).await?)
    }

    async fn download(
        &self,
        record: &ChangeRecord,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64, FeedError> {
        let response = self.content_response(record).await?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(GraphError::from)?;
            sink.write_chunk(&chunk).await.map_err(FeedError::Sink)?;
            written += chunk.len() as u64;
        }

        debug!(id = %record.id, bytes = written, "Downloaded content");
        Ok(written)
    }
}
