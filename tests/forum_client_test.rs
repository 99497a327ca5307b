//! Integration tests for the forum REST client and its error taxonomy.

use std::time::Duration;

use discourse_thread_migrator::forum::{
    ApiError, CreateUserOutcome, ForumClient, NewPost, NewTopic,
};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ForumClient {
    ForumClient::new(&server.uri(), "test-key", "system", Duration::from_secs(5))
}

#[tokio::test]
async fn test_find_topic_by_embed_url_miss_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embed/info.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let found = client(&server)
        .find_topic_by_embed_url("https://wiki.example.org/wiki/Irrigation")
        .await
        .expect("lookup failed");
    assert_eq!(found, None);
}

#[tokio::test]
async fn test_find_topic_by_embed_url_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/embed/info.json"))
        .and(query_param(
            "embed_url",
            "https://wiki.example.org/wiki/Irrigation",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "topic_id": 55
        })))
        .mount(&server)
        .await;

    let found = client(&server)
        .find_topic_by_embed_url("https://wiki.example.org/wiki/Irrigation")
        .await
        .expect("lookup failed");
    assert_eq!(found, Some(55));
}

#[tokio::test]
async fn test_create_topic_sends_credentials_and_author() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .and(wiremock::matchers::header("Api-Key", "test-key"))
        .and(wiremock::matchers::header("Api-Username", "alice"))
        .and(body_partial_json(serde_json::json!({
            "title": "Discussion - Irrigation",
            "embed_url": "https://wiki.example.org/wiki/Irrigation",
            "external_id": "3",
            "category": 12,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 101,
            "topic_id": 55,
            "post_number": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let topic_id = client(&server)
        .create_topic(&NewTopic {
            title: "Discussion - Irrigation",
            body: "<p>announcement</p>",
            category_id: Some(12),
            tags: &[],
            author: "alice",
            embed_url: "https://wiki.example.org/wiki/Irrigation",
            external_id: 3,
        })
        .await
        .expect("topic creation failed");
    assert_eq!(topic_id, 55);
}

#[tokio::test]
async fn test_create_post_rate_limit_is_transient_with_header_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "17")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .create_post(&NewPost {
            body: "hello",
            topic_id: 55,
            author: "alice",
            created_at: None,
            reply_to_post_number: None,
        })
        .await
        .expect_err("expected rate limit error");

    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
}

#[tokio::test]
async fn test_create_post_rate_limit_body_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "errors": ["too fast"],
            "extras": { "wait_seconds": 30 }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_post(&NewPost {
            body: "hello",
            topic_id: 55,
            author: "alice",
            created_at: None,
            reply_to_post_number: None,
        })
        .await
        .expect_err("expected rate limit error");

    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_create_post_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_post(&NewPost {
            body: "hello",
            topic_id: 55,
            author: "alice",
            created_at: None,
            reply_to_post_number: None,
        })
        .await
        .expect_err("expected server error");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_create_post_validation_error_is_permanent_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/posts.json"))
        .respond_with(ResponseTemplate::new(422).set_body_string("post is too short"))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_post(&NewPost {
            body: "x",
            topic_id: 55,
            author: "alice",
            created_at: None,
            reply_to_post_number: None,
        })
        .await
        .expect_err("expected validation error");

    assert!(!err.is_transient());
    match err {
        ApiError::Permanent { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("post is too short"));
        }
        ApiError::Transient { .. } => panic!("expected permanent error"),
    }
}

#[tokio::test]
async fn test_create_user_reports_username_collision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "errors": { "username": ["must be unique"] }
        })))
        .mount(&server)
        .await;

    let outcome = client(&server)
        .create_user("Alice Martin", "Alice.Martin", "alice@example.org")
        .await
        .expect("request failed");
    assert_eq!(outcome, CreateUserOutcome::UsernameTaken);
}

#[tokio::test]
async fn test_create_user_other_rejection_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "message": "email is blocked",
            "errors": { "username": [] }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_user("Alice Martin", "Alice.Martin", "alice@example.org")
        .await
        .expect_err("expected rejection");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_tag_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tag/soil.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tag/unknown.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.tag_exists("soil").await.unwrap());
    assert!(!client.tag_exists("unknown").await.unwrap());
}

#[tokio::test]
async fn test_watch_topic_uses_watching_level() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/t/55/notifications.json"))
        .and(wiremock::matchers::header("Api-Username", "alice"))
        .and(wiremock::matchers::body_string_contains("notification_level=3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).watch_topic(55, "alice").await.unwrap();
}
