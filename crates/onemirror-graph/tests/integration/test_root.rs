//! Integration tests for remote root resolution

use onemirror_core::ports::{FeedError, IChangeFeed};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_resolve_drive_root() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "ROOT!101",
            "name": "root",
            "folder": { "childCount": 4 },
            "root": {}
        })))
        .mount(&server)
        .await;

    let id = feed.resolve_root("/").await.expect("root id");
    assert_eq!(id.as_str(), "ROOT!101");
}

#[tokio::test]
async fn test_resolve_subfolder() {
    let (server, feed) = common::setup_feed("/Documents").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root:/Documents:"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "DOCS!7",
            "name": "Documents",
            "parentReference": { "id": "ROOT!101" },
            "folder": { "childCount": 1 }
        })))
        .mount(&server)
        .await;

    let id = feed.resolve_root("/Documents").await.expect("folder id");
    assert_eq!(id.as_str(), "DOCS!7");
}

#[tokio::test]
async fn test_missing_root_is_not_found() {
    let (server, feed) = common::setup_feed("/Missing").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root:/Missing:"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": { "code": "itemNotFound", "message": "Item does not exist" }
        })))
        .mount(&server)
        .await;

    let err = feed.resolve_root("/Missing").await.unwrap_err();
    assert!(matches!(err, FeedError::NotFound(ref p) if p == "/Missing"), "got {err:?}");
}
