//! Integration tests for the stored, self-refreshing token source

use std::sync::Arc;

use chrono::{Duration, Utc};
use onemirror_core::config::AuthConfig;
use onemirror_core::ports::{FeedError, IAccessTokenSource, IChangeFeed, ICursorStore, Tokens};
use onemirror_graph::auth::{OAuth2Config, PKCEFlow, StoredTokenSource, TokenStore, TOKENS_KEY};
use onemirror_graph::client::GraphClient;
use onemirror_graph::provider::GraphChangeFeed;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::MemoryStore;

fn flow(server: &MockServer) -> PKCEFlow {
    let config = OAuth2Config::from_config(&AuthConfig {
        app_id: Some("test-app".to_string()),
        ..AuthConfig::default()
    })
    .unwrap()
    .with_endpoints(
        format!("{}/authorize", server.uri()),
        format!("{}/token", server.uri()),
    );
    PKCEFlow::new(&config).unwrap()
}

async fn store_with(tokens: &Tokens) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store
        .set(TOKENS_KEY, &serde_json::to_string(tokens).unwrap())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_valid_token_is_used_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(&Tokens {
        access_token: "still-good".to_string(),
        refresh_token: Some("rt".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
    })
    .await;
    let source = StoredTokenSource::new(flow(&server), TokenStore::new(store));

    assert_eq!(source.access_token().await.unwrap(), "still-good");
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "new-rt"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&Tokens {
        access_token: "stale".to_string(),
        refresh_token: Some("old-rt".to_string()),
        expires_at: Utc::now() + Duration::seconds(30),
    })
    .await;
    let source = StoredTokenSource::new(flow(&server), TokenStore::new(store.clone()));

    assert_eq!(source.access_token().await.unwrap(), "fresh-access");
    // Cached: the second call must not hit the token endpoint again.
    assert_eq!(source.access_token().await.unwrap(), "fresh-access");

    let saved: Tokens =
        serde_json::from_str(&store.get(TOKENS_KEY).await.unwrap().unwrap()).unwrap();
    assert_eq!(saved.access_token, "fresh-access");
    assert_eq!(saved.refresh_token.as_deref(), Some("new-rt"));
    assert!(*store.commits.lock().unwrap() >= 1);
}

#[tokio::test]
async fn test_missing_tokens_is_an_error() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::default());
    let source = StoredTokenSource::new(flow(&server), TokenStore::new(store));

    let err = source.access_token().await.unwrap_err();
    assert!(err.to_string().contains("Not logged in"));
}

#[tokio::test]
async fn test_expired_without_refresh_token_is_an_error() {
    let server = MockServer::start().await;
    let store = store_with(&Tokens {
        access_token: "old".to_string(),
        refresh_token: None,
        expires_at: Utc::now() - Duration::minutes(1),
    })
    .await;
    let source = StoredTokenSource::new(flow(&server), TokenStore::new(store));

    assert!(source.access_token().await.is_err());
}

fn expiring_tokens() -> Tokens {
    Tokens {
        access_token: "stale".to_string(),
        refresh_token: Some("rt".to_string()),
        expires_at: Utc::now() + Duration::seconds(30),
    }
}

fn feed_with(source: StoredTokenSource, base_url: String) -> GraphChangeFeed {
    GraphChangeFeed::new(GraphClient::with_base_url(Arc::new(source), base_url), "/")
}

#[tokio::test]
async fn test_unreachable_token_endpoint_is_transient() {
    let idp = MockServer::start().await;
    let flow = flow(&idp);
    let base_url = idp.uri();
    drop(idp);

    let store = store_with(&expiring_tokens()).await;
    let feed = feed_with(StoredTokenSource::new(flow, TokenStore::new(store)), base_url);

    let err = feed.fetch_page(None).await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

#[tokio::test]
async fn test_rejected_refresh_token_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "The refresh token has expired"
        })))
        .mount(&server)
        .await;

    let store = store_with(&expiring_tokens()).await;
    let feed = feed_with(
        StoredTokenSource::new(flow(&server), TokenStore::new(store)),
        server.uri(),
    );

    let err = feed.fetch_page(None).await.unwrap_err();
    assert!(matches!(err, FeedError::Other(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unauthorized_response_forces_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(header("Authorization", "Bearer revoked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "code": "InvalidAuthenticationToken", "message": "Token revoked" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/drive/root/delta"))
        .and(header("Authorization", "Bearer replacement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [],
            "@odata.deltaLink": format!("{}/me/drive/root/delta?token=t", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "replacement",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&Tokens {
        access_token: "revoked".to_string(),
        refresh_token: Some("rt".to_string()),
        expires_at: Utc::now() + Duration::hours(1),
    })
    .await;
    let feed = feed_with(
        StoredTokenSource::new(flow(&server), TokenStore::new(store)),
        server.uri(),
    );

    match feed.fetch_page(None).await.unwrap_err() {
        FeedError::Transient { status, .. } => assert_eq!(status, Some(401)),
        other => panic!("expected transient error, got {other:?}"),
    }
    let page = feed.fetch_page(None).await.expect("retry with refreshed token");
    assert!(page.is_final);
}

#[tokio::test]
async fn test_token_store_clear() {
    let store = store_with(&Tokens {
        access_token: "a".to_string(),
        refresh_token: None,
        expires_at: Utc::now(),
    })
    .await;
    let tokens = TokenStore::new(store.clone());

    assert!(tokens.load().await.unwrap().is_some());
    tokens.clear().await.unwrap();
    assert!(tokens.load().await.unwrap().is_none());
}
