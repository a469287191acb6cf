//! Event delivery integration tests
//!
//! Runs the event logger against a local log server, a temporary file and
//! hook subscribers.

mod helpers;

use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

use waldur_settings::config::{EventsConfig, LogLevel, Settings};
use waldur_settings::services::{Event, EventLogger};

fn events_config() -> EventsConfig {
    Settings::default().events
}

#[tokio::test]
async fn test_events_reach_log_server() {
    helpers::init_test_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        (first, second)
    });

    let config = EventsConfig {
        logserver_host: Some("127.0.0.1".to_string()),
        logserver_port: port,
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();

    let first = Event::new("user_creation_succeeded", "User alice has been created")
        .with_context("user_username", "alice");
    let delivery = events.emit(&first).await.unwrap();
    assert!(delivery.logserver);
    assert!(delivery.delivered());

    let second = Event::new("user_deletion_succeeded", "User bob has been deleted");
    assert!(events.emit(&second).await.unwrap().logserver);

    let (line_one, line_two) = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("log server should receive both events")
        .unwrap();

    let record: Value = serde_json::from_str(&line_one).unwrap();
    assert_eq!(record["event_type"], "user_creation_succeeded");
    assert_eq!(record["message"], "User alice has been created");
    assert_eq!(record["levelname"], "INFO");
    assert_eq!(record["context"]["user_username"], "alice");

    let record: Value = serde_json::from_str(&line_two).unwrap();
    assert_eq!(record["event_type"], "user_deletion_succeeded");
}

fn record_message(line: &str) -> String {
    let record: Value = serde_json::from_str(line).unwrap();
    record["message"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_events_survive_log_server_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    // Takes one event, then goes away together with its listener
    let first_server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        lines.next_line().await.unwrap().unwrap()
    });

    let config = EventsConfig {
        logserver_host: Some("127.0.0.1".to_string()),
        logserver_port: address.port(),
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();

    assert!(events.emit(&Event::new("restart", "one")).await.unwrap().logserver);
    let line = tokio::time::timeout(Duration::from_secs(5), first_server)
        .await
        .expect("first server should receive an event")
        .unwrap();
    assert_eq!(record_message(&line), "one");

    let listener = TcpListener::bind(address).await.unwrap();
    let second_server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let mut received = Vec::new();
        while received.len() < 2 {
            match lines.next_line().await.unwrap() {
                Some(line) => received.push(record_message(&line)),
                None => break,
            }
        }
        received
    });

    assert!(events.emit(&Event::new("restart", "two")).await.unwrap().logserver);
    assert!(events.emit(&Event::new("restart", "three")).await.unwrap().logserver);

    let received = tokio::time::timeout(Duration::from_secs(5), second_server)
        .await
        .expect("restarted server should receive both events")
        .unwrap();
    assert_eq!(received, vec!["two".to_string(), "three".to_string()]);
}

#[tokio::test]
async fn test_unreachable_log_server_does_not_fail_emit() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = EventsConfig {
        logserver_host: Some("127.0.0.1".to_string()),
        logserver_port: port,
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();

    let delivery = events.emit(&Event::new("heartbeat", "nobody listens")).await.unwrap();
    assert!(!delivery.logserver);
    assert!(!delivery.delivered());
}

#[tokio::test]
async fn test_events_are_appended_to_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log").join("events.log");

    let config = EventsConfig {
        log_file: Some(path.clone()),
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();

    for n in 0..3 {
        let delivery = events
            .emit(&Event::new("resource_created", format!("Resource {} created", n)))
            .await
            .unwrap();
        assert!(delivery.file);
    }

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    let records: Vec<Value> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["message"], "Resource 2 created");
}

#[tokio::test]
async fn test_hook_subscribers_receive_events() {
    let config = EventsConfig {
        hook: true,
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();
    assert!(events.hooks_enabled());

    let mut first = events.subscribe().unwrap();
    let mut second = events.subscribe().unwrap();

    let event = Event::new("quota_exceeded", "Quota exceeded").with_level(LogLevel::Warning);
    let delivery = events.emit(&event).await.unwrap();
    assert_eq!(delivery.hooks, 2);

    assert_eq!(first.recv().await.unwrap(), event);
    assert_eq!(second.recv().await.unwrap().uuid, event.uuid);
}

#[tokio::test]
async fn test_hooks_disabled_by_default() {
    let events = EventLogger::new(&events_config()).await.unwrap();
    assert!(!events.hooks_enabled());
    assert!(events.subscribe().is_none());
}

#[tokio::test]
async fn test_events_below_level_are_dropped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("events.log");

    let config = EventsConfig {
        log_file: Some(path.clone()),
        log_level: LogLevel::Warning,
        hook: true,
        ..events_config()
    };
    let events = EventLogger::new(&config).await.unwrap();
    let _subscriber = events.subscribe().unwrap();

    let dropped = events
        .emit(&Event::new("debug_event", "noise").with_level(LogLevel::Info))
        .await
        .unwrap();
    assert!(!dropped.delivered());

    let kept = events
        .emit(&Event::new("failure", "something broke").with_level(LogLevel::Error))
        .await
        .unwrap();
    assert!(kept.file);
    assert_eq!(kept.hooks, 1);

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(written.lines().count(), 1);
    assert!(written.contains("something broke"));
}
