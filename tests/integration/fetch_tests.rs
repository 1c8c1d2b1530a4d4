//! Integration tests for the HTTP fetch layer
//!
//! These tests use wiremock to exercise throttling, retries and decoding
//! against a real HTTP server.

use battle_crawler::api::{Lookup, StatsApi};
use battle_crawler::config::HttpConfig;
use battle_crawler::fetch::{ApiClient, FetchError, StopSignal};
use battle_crawler::ErrorKind;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates an HTTP configuration with short delays for testing
fn create_test_http_config() -> HttpConfig {
    HttpConfig {
        request_delay_ms: 0,
        retry_base_delay_ms: 10,
        max_attempts: 3,
        ..HttpConfig::default()
    }
}

fn create_client(config: &HttpConfig) -> ApiClient {
    ApiClient::new(config, StopSignal::new()).expect("Failed to build client")
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let started = Instant::now();
    let value: Option<Value> = client
        .get_json(&format!("{}/data", mock_server.uri()))
        .await
        .expect("Request should succeed after one retry");

    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert_eq!(value, Some(json!({"ok": true})));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let result: Result<Option<Value>, FetchError> = client
        .get_json(&format!("{}/missing", mock_server.uri()))
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.kind(), ErrorKind::RemoteClientError);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let result: Result<Option<Value>, FetchError> = client
        .get_json(&format!("{}/flaky", mock_server.uri()))
        .await;

    match result {
        Err(FetchError::RetriesExhausted {
            attempts,
            last_status,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_status, 503);
        }
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recovering"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let value: Option<Value> = client
        .get_json(&format!("{}/recovering", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(value, Some(json!([1, 2])));
}

#[tokio::test]
async fn test_empty_body_means_no_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/null"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let empty: Option<Value> = client
        .get_json(&format!("{}/empty", mock_server.uri()))
        .await
        .unwrap();
    let null: Option<Value> = client
        .get_json(&format!("{}/null", mock_server.uri()))
        .await
        .unwrap();

    assert!(empty.is_none());
    assert!(null.is_none());
}

#[tokio::test]
async fn test_malformed_json_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": ["))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_client(&create_test_http_config());
    let result: Result<Option<Value>, FetchError> = client
        .get_json(&format!("{}/broken", mock_server.uri()))
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::DecodeError);
}

#[tokio::test]
async fn test_requests_are_spaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = HttpConfig {
        request_delay_ms: 200,
        ..create_test_http_config()
    };
    let client = create_client(&config);
    let url = format!("{}/ping", mock_server.uri());

    let started = Instant::now();
    for _ in 0..3 {
        let _: Option<Value> = client.get_json(&url).await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_stop_interrupts_retry_wait() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stop = StopSignal::new();
    let client = ApiClient::new(&create_test_http_config(), stop.clone()).unwrap();

    let trigger = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.request_stop();
    });

    let started = Instant::now();
    let result: Result<Option<Value>, FetchError> =
        client.get_json(&format!("{}/slow", mock_server.uri())).await;

    assert!(matches!(result, Err(FetchError::Interrupted)));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_fetchers_treat_client_errors_as_no_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/player/battle-detail/42"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/player/overall/eu/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "wn8": 1500})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Arc::new(create_client(&create_test_http_config()));
    let base_url = url::Url::parse(&mock_server.uri()).unwrap();
    let api = StatsApi::new(client, base_url, "eu");

    assert_eq!(
        api.fetch_battle_detail(42).await.unwrap(),
        Lookup::Skipped { status: 404 }
    );

    let player = api.fetch_player(7).await.unwrap().found().unwrap();
    assert_eq!(player.0["wn8"], json!(1500));
}

#[tokio::test]
async fn test_fetchers_skip_non_retryable_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/player/overall/eu/5"))
        .respond_with(ResponseTemplate::new(501))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/player/battle-detail/9"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Arc::new(create_client(&create_test_http_config()));
    let base_url = url::Url::parse(&mock_server.uri()).unwrap();
    let api = StatsApi::new(client, base_url, "eu");

    assert_eq!(
        api.fetch_player(5).await.unwrap(),
        Lookup::Skipped { status: 501 }
    );
    assert_eq!(api.fetch_battle_detail(9).await.unwrap(), Lookup::Empty);
}
