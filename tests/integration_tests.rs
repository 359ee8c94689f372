//! Integration tests using wiremock to simulate HTTP servers.

use layerfetch::retry::{Delay, RetryOn5xx, RetryOnTimeout, RetryOptions};
use layerfetch::{Client, Error, ErrorKind, FetchOptions, Issue, Progress, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn test_data() -> TestData {
    TestData {
        id: 1,
        name: "Test".to_string(),
    }
}

fn client_for(mock_server: &MockServer) -> Client {
    Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let reply = client.get::<TestData>("/test").await.unwrap();

    assert_eq!(reply.data, test_data());
    assert_eq!(reply.status.as_u16(), 200);
    assert_eq!(reply.attempts, 1);
    assert!(!reply.was_retried());
}

#[tokio::test]
async fn test_post_serializes_json_and_infers_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/test"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"a": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_json(test_data()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let reply = client
        .post::<_, TestData>("/test", &json!({"a": 1}))
        .await
        .unwrap();

    assert_eq!(reply.data, test_data());
    assert_eq!(reply.status.as_u16(), 201);
}

#[tokio::test]
async fn test_upload_progress_keeps_content_length() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_json(json!({"a": 1})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let events: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let client = client_for(&mock_server);
    client
        .fetch::<Value>(
            "/upload",
            FetchOptions::new()
                .method(http::Method::POST)
                .json(&json!({"a": 1}))
                .unwrap()
                .on_upload_progress(move |p| sink.lock().unwrap().push(p.clone())),
        )
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received[0].headers.get("content-length").unwrap(), "7");
    assert!(received[0].headers.get("transfer-encoding").is_none());

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].ratio, Some(1.0));
}

#[tokio::test]
async fn test_text_body_is_sent_untouched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/notes/1"))
        .and(body_string("just words"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let reply = client
        .fetch::<Value>(
            "/notes/1",
            FetchOptions::new()
                .method(http::Method::PUT)
                .text("just words"),
        )
        .await
        .unwrap();

    assert_eq!(reply.data, Value::Null);
    let received = mock_server.received_requests().await.unwrap();
    assert!(received[0].headers.get("content-type").is_none());
}

#[tokio::test]
async fn test_empty_body_parses_to_null() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let reply = client.get::<Value>("/empty").await.unwrap();
    assert_eq!(reply.data, Value::Null);
}

#[tokio::test]
async fn test_non_json_body_parses_to_text() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/plain"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let reply = client.get::<String>("/plain").await.unwrap();
    assert_eq!(reply.data, "hello");
}

#[tokio::test]
async fn test_http_error_4xx_is_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client.get::<TestData>("/test").await;

    match result {
        Err(Error::Rejected(rejected)) => {
            assert_eq!(rejected.status.as_u16(), 404);
            assert_eq!(rejected.data, json!({"error": "not found"}));
            assert_eq!(rejected.method, http::Method::GET);
            assert_eq!(rejected.url.path(), "/test");
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_predicate_retries_rejected_responses() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client
        .fetch::<TestData>("/test", FetchOptions::new().retry(RetryOptions::new().attempts(1)))
        .await;

    match result {
        Err(Error::Rejected(rejected)) => {
            assert_eq!(rejected.status.as_u16(), 500);
            assert_eq!(rejected.data, json!("Server error"));
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_on_5xx_until_success() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    // First two requests fail with 500, third succeeds
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(500).set_body_string("Server error")
            } else {
                ResponseTemplate::new(200).set_body_json(test_data())
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry(
            RetryOptions::new()
                .when(RetryOn5xx)
                .attempts(3)
                .delay(Duration::from_millis(10)),
        )
        .build()
        .unwrap();

    let reply = client.get::<TestData>("/test").await.unwrap();

    assert_eq!(reply.data.id, 1);
    assert_eq!(reply.attempts, 3);
    assert!(reply.was_retried());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_4xx_not_retried_by_5xx_predicate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad request"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry(RetryOptions::new().when(RetryOn5xx).attempts(3))
        .build()
        .unwrap();

    let err = client.get::<TestData>("/test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
}

#[tokio::test]
async fn test_deserialization_failure_is_validation_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    match client.get::<TestData>("/test").await {
        Err(Error::Validation { data, issues }) => {
            assert_eq!(data, json!({"unexpected": true}));
            assert_eq!(issues.len(), 1);
        }
        other => panic!("Expected Validation, got {:?}", other),
    }
}

struct RequiresName;

#[async_trait::async_trait]
impl Schema for RequiresName {
    async fn validate(&self, value: &Value) -> Result<Value, Vec<Issue>> {
        match value.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => Ok(value.clone()),
            _ => Err(vec![Issue::at(["name"], "must be a non-empty string")]),
        }
    }
}

#[tokio::test]
async fn test_schema_validation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 2, "name": ""})))
        .mount(&mock_server)
        .await;

    let defaults = FetchOptions::new()
        .base_url(mock_server.uri())
        .unwrap()
        .schema(RequiresName);
    let client = Client::builder().defaults(defaults).build().unwrap();

    let reply = client.get::<TestData>("/good").await.unwrap();
    assert_eq!(reply.data, test_data());

    match client.get::<TestData>("/bad").await {
        Err(Error::Validation { data, issues }) => {
            assert_eq!(data["id"], 2);
            assert_eq!(issues, vec![Issue::at(["name"], "must be a non-empty string")]);
        }
        other => panic!("Expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_and_call_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test"))
        .and(header("x-api-key", "secret"))
        .and(header("x-request-id", "call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .default_header("X-Api-Key", "secret")
        .unwrap()
        .default_header("X-Request-Id", "factory")
        .unwrap()
        .build()
        .unwrap();

    client
        .fetch::<TestData>("/test", FetchOptions::new().header("x-request-id", "call").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_call_can_remove_default_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_data()))
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .default_header("authorization", "Bearer token")
        .unwrap()
        .build()
        .unwrap();

    client
        .fetch::<TestData>(
            "/public",
            FetchOptions::new().remove_header("Authorization").unwrap(),
        )
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert!(received[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_query_parameters_from_three_sources() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "3"))
        .and(query_param("limit", "50"))
        .and(query_param("lang", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .param("page", 1)
        .param("limit", 20)
        .param("lang", "en")
        .build()
        .unwrap();

    let reply = client
        .fetch::<Vec<Value>>("/search?page=3", FetchOptions::new().param("limit", 50))
        .await
        .unwrap();
    assert!(reply.data.is_empty());

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), Some("page=3&limit=50&lang=en"));
}

#[tokio::test]
async fn test_all_http_methods() {
    let mock_server = MockServer::start().await;

    for verb in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
        Mock::given(method(verb))
            .and(path("/resource"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"method": verb})))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let client = client_for(&mock_server);
    let body = json!({"k": "v"});

    let get = client.get::<Value>("/resource").await.unwrap();
    let post = client.post::<_, Value>("/resource", &body).await.unwrap();
    let put = client.put::<_, Value>("/resource", &body).await.unwrap();
    let patch = client.patch::<_, Value>("/resource", &body).await.unwrap();
    let delete = client.delete::<Value>("/resource").await.unwrap();

    assert_eq!(get.data["method"], "GET");
    assert_eq!(post.data["method"], "POST");
    assert_eq!(put.data["method"], "PUT");
    assert_eq!(patch.data["method"], "PATCH");
    assert_eq!(delete.data["method"], "DELETE");
}

#[tokio::test]
async fn test_timeout_is_per_attempt_and_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(test_data())
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client
        .fetch::<TestData>(
            "/slow",
            FetchOptions::new()
                .timeout(Duration::from_millis(50))
                .retry(RetryOptions::new().when(RetryOnTimeout).attempts(1)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_retry_after_header_sets_delay() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    // First request returns 429 with Retry-After, second succeeds
    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "1")
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_string("Rate limited")
            } else {
                ResponseTemplate::new(200).set_body_json(test_data())
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry(RetryOptions::new().attempts(3).delay(Delay::retry_after(
            Delay::Fixed(Duration::from_millis(10)),
            Duration::from_secs(5),
        )))
        .build()
        .unwrap();

    let start = std::time::Instant::now();
    let reply = client.get::<TestData>("/test").await.unwrap();

    assert_eq!(reply.data.id, 1);
    assert_eq!(reply.attempts, 2);
    // Should have waited approximately 1 second for rate limit
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_retry_after_is_capped_by_max_wait() {
    let mock_server = MockServer::start().await;
    let attempt_count = Arc::new(AtomicUsize::new(0));
    let attempt_count_clone = attempt_count.clone();

    Mock::given(method("GET"))
        .and(path("/test"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                ResponseTemplate::new(429).insert_header("retry-after", "3600")
            } else {
                ResponseTemplate::new(200).set_body_json(test_data())
            }
        })
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .base_url(mock_server.uri())
        .unwrap()
        .retry(RetryOptions::new().attempts(1).delay(Delay::retry_after(
            Delay::Fixed(Duration::ZERO),
            Duration::from_millis(200),
        )))
        .build()
        .unwrap();

    let start = std::time::Instant::now();
    client.get::<TestData>("/test").await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_download_progress_reaches_completion() {
    let mock_server = MockServer::start().await;
    let payload = "x".repeat(64 * 1024);

    Mock::given(method("GET"))
        .and(path("/large"))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload.clone()))
        .mount(&mock_server)
        .await;

    let events: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let client = client_for(&mock_server);
    let reply = client
        .fetch::<String>(
            "/large",
            FetchOptions::new().on_download_progress(move |p| sink.lock().unwrap().push(p.clone())),
        )
        .await
        .unwrap();
    assert_eq!(reply.data.len(), payload.len());

    let events = events.lock().unwrap();
    assert!(events.len() >= 2);
    let first = &events[0];
    assert_eq!(first.ratio, Some(0.0));
    assert_eq!(first.transferred_bytes, 0);
    let last = events.last().unwrap();
    assert_eq!(last.ratio, Some(1.0));
    assert_eq!(last.total_bytes, Some(payload.len() as u64));
    assert_eq!(last.transferred_bytes, payload.len() as u64);
}

#[tokio::test]
async fn test_error_is_retryable() {
    let error_timeout = Error::Timeout;
    assert!(error_timeout.is_retryable());

    let error_config = Error::Configuration("Error".to_string());
    assert!(!error_config.is_retryable());
}
