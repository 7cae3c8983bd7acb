//! Integration tests for streamed content download

use onemirror_core::domain::newtypes::RemoteId;
use onemirror_core::domain::ChangeRecord;
use onemirror_core::ports::{FeedError, IChangeFeed};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn record(id: &str, size: u64) -> ChangeRecord {
    ChangeRecord::file(
        RemoteId::new(id.to_string()).unwrap(),
        "file.bin",
        RemoteId::new("root-id".to_string()).unwrap(),
        size,
        chrono::Utc::now(),
    )
}

#[tokio::test]
async fn test_download_via_preauthenticated_url() {
    let (server, feed) = common::setup_feed("/").await;
    let content = vec![7u8; 300_000];

    Mock::given(method("GET"))
        .and(path("/download/file-001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let record = record("file-001", content.len() as u64)
        .with_download_handle(format!("{}/download/file-001", server.uri()));

    let mut sink: Vec<u8> = Vec::new();
    let written = feed.download(&record, &mut sink).await.expect("download");
    assert_eq!(written, content.len() as u64);
    assert_eq!(sink, content);
}

#[tokio::test]
async fn test_download_without_handle_uses_content_endpoint() {
    let (server, feed) = common::setup_feed("/").await;
    common::mount_download(&server, "file-002", b"hello world").await;

    let mut sink: Vec<u8> = Vec::new();
    let written = feed.download(&record("file-002", 11), &mut sink).await.expect("download");
    assert_eq!(written, 11);
    assert_eq!(sink, b"hello world");
}

#[tokio::test]
async fn test_rejected_handle_falls_back_to_content_endpoint() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/download/expired"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    common::mount_download(&server, "file-003", b"fresh").await;

    let record =
        record("file-003", 5).with_download_handle(format!("{}/download/expired", server.uri()));
    let mut sink: Vec<u8> = Vec::new();
    feed.download(&record, &mut sink).await.expect("fallback download");
    assert_eq!(sink, b"fresh");
}

#[tokio::test]
async fn test_missing_item_is_not_found() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/items/gone/content"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut sink: Vec<u8> = Vec::new();
    let err = feed.download(&record("gone", 1), &mut sink).await.unwrap_err();
    assert!(matches!(err, FeedError::NotFound(_)), "got {err:?}");
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/items/busy/content"))
        .respond_with(ResponseTemplate::new(503).append_header("Retry-After", "3"))
        .mount(&server)
        .await;

    let mut sink: Vec<u8> = Vec::new();
    let err = feed.download(&record("busy", 1), &mut sink).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
