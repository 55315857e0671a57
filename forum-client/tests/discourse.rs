use digest_core::{CoreError, ForumConfig, ProviderError, RateLimitConfig, RetryConfig};
use forum_client::{DiscourseClient, ForumProvider};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, max_pages: u32) -> DiscourseClient {
    let config = ForumConfig {
        base_url: server.uri(),
        max_pages,
        timeout_secs: 5,
        rate_limit: RateLimitConfig::unlimited(),
        ..Default::default()
    };
    let retry = RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_factor: 0.0,
        ..Default::default()
    };
    DiscourseClient::new(&config, retry).unwrap()
}

fn latest_page(topic_id: u64, more: bool) -> serde_json::Value {
    json!({
        "users": [{"id": 7, "username": "rob"}],
        "topic_list": {
            "more_topics_url": if more { json!("/latest?page=1") } else { json!(null) },
            "topics": [{
                "id": topic_id,
                "title": format!("Topic {}", topic_id),
                "slug": format!("topic-{}", topic_id),
                "posts_count": 3,
                "views": 40,
                "created_at": "2026-10-16T10:00:00.000Z",
                "category_id": 1,
                "posters": [{"user_id": 7, "description": "Original Poster"}]
            }]
        }
    })
}

#[tokio::test]
async fn test_fetches_pages_until_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/categories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "category_list": {"categories": [{"id": 1, "name": "Tech Talk"}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(latest_page(100, true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(latest_page(101, false)))
        .expect(1)
        .mount(&server)
        .await;

    let records = client_for(&server, 5).fetch_posts().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], 100);
    assert_eq!(records[0]["author"], "rob");
    assert_eq!(records[0]["category"], "Tech Talk");
    assert_eq!(records[1]["replies"], 2);
}

#[tokio::test]
async fn test_missing_categories_is_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/categories.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(latest_page(5, false)))
        .mount(&server)
        .await;

    let records = client_for(&server, 1).fetch_posts().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0]["category"].is_null());
}

#[tokio::test]
async fn test_server_errors_are_retried_then_surface() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/categories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "category_list": {"categories": []}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let err = client_for(&server, 1).fetch_posts().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Provider(ProviderError::ServerError {
            status_code: 503,
            ..
        })
    ));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/categories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "category_list": {"categories": []}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latest.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server, 1).fetch_posts().await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Provider(ProviderError::NotFound { .. })
    ));
}
