//! Integration tests for the HTTP collaborator clients using wiremock mocks.

use reelscope_analysis::{
    AssetAnalyzer, CollaboratorError, HttpAssetAnalyzer, HttpPoolProvider, HttpSettings,
    PoolProvider,
};
use reelscope_core::{AnalysisContext, AssetLinkage, ContentSource, MediaAsset, PoolRequest};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_settings(max_retries: u32) -> HttpSettings {
    HttpSettings {
        timeout_secs: 5,
        max_retries,
        backoff_base_ms: 0,
    }
}

fn asset() -> MediaAsset {
    MediaAsset {
        id: 42,
        downloaded: true,
        storage_pointer: Some("media/42.mp4".to_string()),
        linkage: AssetLinkage::CompetitorSnapshot(7),
        has_analysis: false,
    }
}

fn context() -> AnalysisContext {
    AnalysisContext {
        brand_name: Some("Acme".to_string()),
        niche: Some("beverages".to_string()),
        platform: Some("tiktok".to_string()),
        source: ContentSource::Competitor,
    }
}

#[tokio::test]
async fn pool_provider_posts_request_and_parses_pool() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "posts": [
            {
                "postId": "p-1",
                "source": "client",
                "platform": "instagram",
                "handle": "acme",
                "likes": 120,
                "comments": 8,
                "views": 4000,
                "postedAt": "2025-03-01T12:00:00Z",
                "mediaAssetIds": [1, 2]
            },
            {
                "postId": "p-2",
                "source": "competitor",
                "platform": "tiktok",
                "handle": "rival",
                "mediaAssetIds": [3]
            }
        ],
        "summary": {
            "readySnapshotCounts": { "client": 1, "competitor": 1 },
            "droppedNoMedia": 2,
            "droppedNoMetrics": 1,
            "droppedOutOfScopeCompetitor": 0,
            "qualifiedPosts": 2
        }
    });

    Mock::given(method("POST"))
        .and(path("/jobs/17/qualified-pool"))
        .and(body_partial_json(serde_json::json!({
            "allowDegradedSnapshots": true,
            "requireScopedCompetitors": true,
            "maxPostsPerSnapshot": 12
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpPoolProvider::new(&server.uri(), fast_settings(0)).expect("client");
    let request = PoolRequest {
        allow_degraded_snapshots: true,
        ..PoolRequest::default()
    };
    let pool = provider.fetch_pool(17, &request).await.expect("pool");

    assert_eq!(pool.posts.len(), 2);
    assert_eq!(pool.posts[0].comments, 8);
    assert!(pool.posts[0].posted_at.is_some());
    assert_eq!(pool.posts[1].source, ContentSource::Competitor);
    assert_eq!(pool.posts[1].likes, 0);
    assert_eq!(pool.summary.dropped_no_media, 2);
    assert_eq!(pool.distinct_asset_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn pool_provider_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs/1/qualified-pool"))
        .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/jobs/1/qualified-pool"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "posts": [] })),
        )
        .mount(&server)
        .await;

    let provider = HttpPoolProvider::new(&server.uri(), fast_settings(2)).expect("client");
    let pool = provider
        .fetch_pool(1, &PoolRequest::default())
        .await
        .expect("second attempt should succeed");
    assert!(pool.posts.is_empty());
}

#[tokio::test]
async fn pool_provider_surfaces_client_errors_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs/9/qualified-pool"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such job"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpPoolProvider::new(&server.uri(), fast_settings(3)).expect("client");
    let err = provider
        .fetch_pool(9, &PoolRequest::default())
        .await
        .expect_err("404 should fail");
    match err {
        CollaboratorError::Status {
            service,
            status,
            body,
        } => {
            assert_eq!(service, "pool");
            assert_eq!(status, 404);
            assert_eq!(body, "no such job");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn pool_provider_rejects_malformed_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let provider = HttpPoolProvider::new(&server.uri(), fast_settings(0)).expect("client");
    let err = provider
        .fetch_pool(1, &PoolRequest::default())
        .await
        .expect_err("html is not a pool");
    assert!(matches!(err, CollaboratorError::Deserialize { .. }));
}

#[tokio::test]
async fn analyzer_sends_bearer_and_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .and(header("authorization", "Bearer sk-test-key"))
        .and(body_partial_json(serde_json::json!({
            "asset": { "id": 42, "linkage": { "kind": "competitor_snapshot", "id": 7 } },
            "context": { "brandName": "Acme", "platform": "tiktok", "source": "competitor" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer =
        HttpAssetAnalyzer::new(&server.uri(), "sk-test-key", fast_settings(0)).expect("client");
    let verdict = analyzer.analyze(&asset(), &context()).await.expect("verdict");
    assert!(verdict.success);
    assert_eq!(verdict.error, None);
}

#[tokio::test]
async fn analyzer_failure_verdict_is_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "unsupported media type"
        })))
        .mount(&server)
        .await;

    let analyzer =
        HttpAssetAnalyzer::new(&server.uri(), "sk-test-key", fast_settings(0)).expect("client");
    let verdict = analyzer.analyze(&asset(), &context()).await.expect("verdict");
    assert!(!verdict.success);
    assert_eq!(verdict.error.as_deref(), Some("unsupported media type"));
}

#[tokio::test]
async fn analyzer_gives_up_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/analyze"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let analyzer =
        HttpAssetAnalyzer::new(&server.uri(), "sk-test-key", fast_settings(2)).expect("client");
    let err = analyzer
        .analyze(&asset(), &context())
        .await
        .expect_err("502 should exhaust retries");
    assert!(matches!(err, CollaboratorError::Status { status: 502, .. }));
}

#[test]
fn invalid_base_url_is_rejected() {
    let result = HttpPoolProvider::new("::not a url::", HttpSettings::default());
    assert!(matches!(result, Err(CollaboratorError::InvalidUrl { .. })));
}
