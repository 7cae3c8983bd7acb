//! Shared test helpers for Graph API integration tests
//!
//! Provides wiremock-based mock server setup for Microsoft Graph API endpoints
//! and an in-memory key/value store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use onemirror_core::ports::ICursorStore;
use onemirror_graph::auth::StaticTokenSource;
use onemirror_graph::client::GraphClient;
use onemirror_graph::provider::GraphChangeFeed;

/// Starts a mock server and returns a feed over `remote_root` pointed at it.
pub async fn setup_feed(remote_root: &str) -> (MockServer, GraphChangeFeed) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_url(
        Arc::new(StaticTokenSource::new("test-access-token")),
        server.uri(),
    );
    (server, GraphChangeFeed::new(client, remote_root))
}

/// A file item as Graph returns it in a delta page.
pub fn file_item(id: &str, name: &str, parent: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "size": size,
        "lastModifiedDateTime": "2026-01-15T10:00:00.120Z",
        "parentReference": { "id": parent },
        "file": { "mimeType": "text/plain" }
    })
}

/// A folder item as Graph returns it in a delta page.
pub fn folder_item(id: &str, name: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "parentReference": { "id": parent },
        "folder": { "childCount": 0 }
    })
}

/// Mounts a delta endpoint that returns a single, final page.
pub async fn mount_delta_single_page(
    server: &MockServer,
    delta_path: &str,
    items: serde_json::Value,
    delta_token: &str,
) {
    Mock::given(method("GET"))
        .and(path(delta_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": items,
            "@odata.deltaLink": format!("{}{}?token={}", server.uri(), delta_path, delta_token)
        })))
        .mount(server)
        .await;
}

/// Mounts a raw item download endpoint for a specific item ID.
pub async fn mount_download(server: &MockServer, item_id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/me/drive/items/{item_id}/content")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Key/value store kept in memory; commits are counted.
#[derive(Default)]
pub struct MemoryStore {
    pub values: Mutex<HashMap<String, String>>,
    pub commits: Mutex<u32>,
}

#[async_trait::async_trait]
impl ICursorStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        *self.commits.lock().unwrap() += 1;
        Ok(())
    }
}
