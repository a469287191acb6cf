//! Sentry reporting integration tests
//!
//! Reports go to a wiremock server standing in for the Sentry store API.

use assert_matches::assert_matches;
use serde_json::Value;
use wiremock::{
    matchers::{header_exists, method, path},
    Mock, MockServer, ResponseTemplate,
};

use waldur_settings::config::{LogLevel, SentryConfig};
use waldur_settings::services::ErrorReporter;
use waldur_settings::WaldurError;

async fn reporter_for(server: &MockServer) -> ErrorReporter {
    let config = SentryConfig {
        dsn: Some(format!("http://public:private@{}/42", server.address())),
    };
    ErrorReporter::from_config(&config)
        .expect("DSN should parse")
        .expect("reporter should be configured")
}

#[tokio::test]
async fn test_message_is_posted_to_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/42/store/"))
        .and(header_exists("X-Sentry-Auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = reporter_for(&server).await;
    let event_id = reporter
        .capture_message("Database backup failed", LogLevel::Critical)
        .await
        .expect("report should be accepted");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let auth = requests[0].headers.get("X-Sentry-Auth").unwrap().to_str().unwrap();
    assert!(auth.starts_with("Sentry sentry_version=7"));
    assert!(auth.contains("sentry_key=public"));
    assert!(auth.contains("sentry_secret=private"));

    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["event_id"], event_id.simple().to_string());
    assert_eq!(body["level"], "fatal");
    assert_eq!(body["message"]["formatted"], "Database backup failed");
}

#[tokio::test]
async fn test_rejected_report_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/42/store/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let reporter = reporter_for(&server).await;
    let result = reporter.capture_message("Denied", LogLevel::Error).await;

    assert_matches!(result, Err(WaldurError::Reporting(_)));
}

#[test]
fn test_no_dsn_means_no_reporter() {
    let reporter = ErrorReporter::from_config(&SentryConfig { dsn: None }).unwrap();
    assert!(reporter.is_none());
}

#[test]
fn test_malformed_dsn_is_a_settings_error() {
    let result = ErrorReporter::from_config(&SentryConfig {
        dsn: Some("sentry.example.com/42".to_string()),
    });

    assert_matches!(result, Err(WaldurError::Settings(_)));
}
