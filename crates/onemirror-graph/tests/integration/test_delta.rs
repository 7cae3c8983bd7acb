//! Integration tests for delta page fetching
//!
//! Verifies the Graph change feed against a wiremock-based Graph API mock:
//! - Initial enumeration of the drive root and of a sub-folder
//! - Incremental fetch from a stored delta link
//! - Pagination via nextLink
//! - Invalidation (410 Gone, resync error codes)
//! - Transient failures with and without Retry-After

use std::time::Duration;

use onemirror_core::domain::newtypes::Cursor;
use onemirror_core::domain::ItemKind;
use onemirror_core::ports::{FeedError, IChangeFeed};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_initial_enumeration_of_drive_root() {
    let (server, feed) = common::setup_feed("/").await;

    let items = serde_json::json!([
        common::folder_item("folder-001", "Documents", "root-id"),
        common::file_item("file-001", "notes.txt", "folder-001", 11),
    ]);
    common::mount_delta_single_page(&server, "/me/drive/root/delta", items, "token-001").await;

    let page = feed.fetch_page(None).await.expect("initial page");

    assert!(page.is_final);
    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].kind, ItemKind::Folder);
    assert_eq!(page.records[1].name, "notes.txt");
    assert_eq!(page.records[1].size, Some(11));
    assert_eq!(
        page.next_cursor.unwrap().as_str(),
        format!("{}/me/drive/root/delta?token=token-001", server.uri())
    );
}

#[tokio::test]
async fn test_initial_enumeration_of_subfolder() {
    let (server, feed) = common::setup_feed("/Documents/Work").await;

    let items = serde_json::json!([common::file_item("f", "a.txt", "work-id", 1)]);
    common::mount_delta_single_page(&server, "/me/drive/root:/Documents/Work:/delta", items, "t").await;

    let page = feed.fetch_page(None).await.expect("subfolder page");
    assert_eq!(page.records.len(), 1);
    assert!(page.is_final);
}

#[tokio::test]
async fn test_requests_carry_bearer_token() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=x", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    feed.fetch_page(None).await.expect("authorized page");
}

#[tokio::test]
async fn test_incremental_fetch_uses_stored_link() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(query_param("token", "previous-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::file_item("file-002", "new.txt", "root-id", 5) ],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=next-token", server.uri())
        })))
        .mount(&server)
        .await;

    let cursor = Cursor::new(format!(
        "{}/me/drive/root/delta?token=previous-token",
        server.uri()
    ))
    .unwrap();
    let page = feed.fetch_page(Some(&cursor)).await.expect("incremental page");

    assert_eq!(page.records.len(), 1);
    assert_eq!(page.records[0].id.as_str(), "file-002");
    assert!(page.next_cursor.unwrap().as_str().ends_with("token=next-token"));
}

#[tokio::test]
async fn test_pagination_via_next_link() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(query_param_is_missing("$skiptoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::folder_item("d1", "A", "root-id") ],
            "@odata.nextLink": format!("{}/me/drive/root/delta?$skiptoken=page2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [ common::file_item("f1", "b.txt", "d1", 3) ],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=final", server.uri())
        })))
        .mount(&server)
        .await;

    let first = feed.fetch_page(None).await.expect("page 1");
    assert!(!first.is_final);
    assert_eq!(first.records[0].name, "A");

    let next = first.next_cursor.expect("next link");
    let second = feed.fetch_page(Some(&next)).await.expect("page 2");
    assert!(second.is_final);
    assert_eq!(second.records[0].name, "b.txt");
    assert!(second.next_cursor.unwrap().as_str().ends_with("token=final"));
}

#[tokio::test]
async fn test_gone_signals_invalidation() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(410).set_body_json(serde_json::json!({
            "error": { "code": "resyncRequired", "message": "The delta token is expired" }
        })))
        .mount(&server)
        .await;

    let cursor = Cursor::new(format!("{}/me/drive/root/delta?token=old", server.uri())).unwrap();
    let err = feed.fetch_page(Some(&cursor)).await.unwrap_err();
    assert!(matches!(err, FeedError::Invalidated), "got {err:?}");
}

#[tokio::test]
async fn test_resync_error_code_signals_invalidation() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": "resyncChangesApplyDifferences", "message": "resync" }
        })))
        .mount(&server)
        .await;

    let err = feed.fetch_page(None).await.unwrap_err();
    assert!(matches!(err, FeedError::Invalidated), "got {err:?}");
}

#[tokio::test]
async fn test_throttling_is_transient_with_retry_after() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(
            ResponseTemplate::new(429)
                .append_header("Retry-After", "7")
                .set_body_json(serde_json::json!({
                    "error": { "code": "activityLimitReached", "message": "Slow down" }
                })),
        )
        .mount(&server)
        .await;

    match feed.fetch_page(None).await.unwrap_err() {
        FeedError::Transient {
            status,
            retry_after,
            message,
        } => {
            assert_eq!(status, Some(429));
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
            assert_eq!(message, "Slow down");
        }
        other => panic!("expected transient error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_transient_without_retry_after() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    match feed.fetch_page(None).await.unwrap_err() {
        FeedError::Transient {
            status,
            retry_after,
            ..
        } => {
            assert_eq!(status, Some(500));
            assert_eq!(retry_after, None);
        }
        other => panic!("expected transient error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_not_transient() {
    let (server, feed) = common::setup_feed("/").await;

    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{ not json"))
        .mount(&server)
        .await;

    let err = feed.fetch_page(None).await.unwrap_err();
    assert!(matches!(err, FeedError::Other(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let (server, feed) = common::setup_feed("/").await;
    drop(server);

    let err = feed.fetch_page(None).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
