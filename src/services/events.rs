//! Event log delivery
//!
//! Events are structured audit records (resource created, user logged in,
//! ...). The `[events]` section decides where they go: a JSON lines file,
//! a TCP log server, the local syslog and in-process hook subscribers.

use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{EventsConfig, LogLevel};
use crate::utils::errors::Result;
use crate::utils::logging::log_event_delivery_failure;
use crate::utils::syslog::SyslogWriter;

/// Buffered events per hook subscriber before the slowest one lags
pub const HOOK_CAPACITY: usize = 256;

/// Syslog tag of delivered events
pub const EVENTS_SYSLOG_TAG: &str = "waldur-events";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A single audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uuid: Uuid,
    pub event_type: String,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            event_type: event_type.into(),
            message: message.into(),
            level: LogLevel::Info,
            timestamp: Utc::now(),
            context: Map::new(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Record shipped to sinks, in the log server's field layout
    pub fn to_record(&self) -> Value {
        json!({
            "@timestamp": self.timestamp.to_rfc3339(),
            "@version": "1",
            "type": "event",
            "event_type": self.event_type,
            "levelname": self.level.as_str(),
            "message": self.message,
            "uuid": self.uuid.simple().to_string(),
            "context": self.context,
        })
    }

    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_record())?)
    }
}

/// Which sinks accepted an event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub file: bool,
    pub logserver: bool,
    pub syslog: bool,
    /// Number of hook subscribers the event reached
    pub hooks: usize,
}

impl Delivery {
    pub fn delivered(&self) -> bool {
        self.file || self.logserver || self.syslog || self.hooks > 0
    }
}

/// Newline-delimited JSON over a persistent TCP connection
#[derive(Debug)]
struct LogServerSink {
    address: String,
    stream: Mutex<Option<TcpStream>>,
}

impl LogServerSink {
    fn new(address: String) -> Self {
        Self {
            address,
            stream: Mutex::new(None),
        }
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "log server connect timed out")),
        }
    }

    /// Send one line, reconnecting once when the connection went away
    async fn send(&self, line: &str) -> io::Result<()> {
        let payload = format!("{}\n", line);
        let mut guard = self.stream.lock().await;
        let mut last_error = None;

        // A write into a socket the server already closed still succeeds locally
        if let Some(stream) = guard.take() {
            match reuse_if_open(stream) {
                Ok(Some(stream)) => *guard = Some(stream),
                Ok(None) | Err(_) => {
                    debug!(address = %self.address, "Event log server closed the connection");
                }
            }
        }

        for _ in 0..2 {
            if guard.is_none() {
                *guard = Some(self.connect().await?);
                debug!(address = %self.address, "Connected to event log server");
            }
            let Some(stream) = guard.as_mut() else {
                continue;
            };
            match stream.write_all(payload.as_bytes()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    *guard = None;
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "log server unavailable")))
    }
}

/// Delivers events to the sinks enabled in `[events]`
#[derive(Debug)]
pub struct EventLogger {
    min_level: LogLevel,
    file: Option<Mutex<File>>,
    logserver: Option<LogServerSink>,
    syslog: Option<SyslogWriter>,
    hooks: Option<broadcast::Sender<Event>>,
}

impl EventLogger {
    /// Open the configured sinks
    pub async fn new(config: &EventsConfig) -> Result<Self> {
        let file = match &config.log_file {
            Some(path) => Some(Mutex::new(open_append(path).await?)),
            None => None,
        };

        let logserver = config.logserver_address().map(LogServerSink::new);

        let syslog = if config.syslog {
            match SyslogWriter::connect(EVENTS_SYSLOG_TAG) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    warn!(error = %e, "Syslog unavailable, events will not be sent to syslog");
                    None
                }
            }
        } else {
            None
        };

        let hooks = config.hook.then(|| broadcast::channel(HOOK_CAPACITY).0);

        info!(
            level = %config.log_level,
            file = ?config.log_file,
            logserver = ?config.logserver_address(),
            syslog = syslog.is_some(),
            hook = config.hook,
            "Event logger initialized"
        );

        Ok(Self {
            min_level: config.log_level,
            file,
            logserver,
            syslog,
            hooks,
        })
    }

    /// Receive events as hook subscriber; `None` unless `hook = true`
    pub fn subscribe(&self) -> Option<broadcast::Receiver<Event>> {
        self.hooks.as_ref().map(|sender| sender.subscribe())
    }

    pub fn hooks_enabled(&self) -> bool {
        self.hooks.is_some()
    }

    /// Deliver an event to every enabled sink
    ///
    /// Events below the configured level are dropped. A failing file sink
    /// fails the call; the other sinks only log their failures.
    pub async fn emit(&self, event: &Event) -> Result<Delivery> {
        let mut delivery = Delivery::default();

        if event.level < self.min_level {
            debug!(event_type = %event.event_type, level = %event.level, "Event below configured level dropped");
            return Ok(delivery);
        }

        let line = event.to_json_line()?;

        if let Some(file) = &self.file {
            let mut file = file.lock().await;
            file.write_all(format!("{}\n", line).as_bytes()).await?;
            file.flush().await?;
            delivery.file = true;
        }

        if let Some(server) = &self.logserver {
            match server.send(&line).await {
                Ok(()) => delivery.logserver = true,
                Err(e) => log_event_delivery_failure("logserver", &event.event_type, &e.to_string()),
            }
        }

        if let Some(syslog) = &self.syslog {
            match syslog.send(event.level.syslog_severity(), &line) {
                Ok(()) => delivery.syslog = true,
                Err(e) => log_event_delivery_failure("syslog", &event.event_type, &e.to_string()),
            }
        }

        if let Some(hooks) = &self.hooks {
            // No subscribers is not an error
            delivery.hooks = hooks.send(event.clone()).unwrap_or(0);
        }

        debug!(event_type = %event.event_type, ?delivery, "Event emitted");
        Ok(delivery)
    }
}

/// Hand the stream back unless the peer has closed or reset it
fn reuse_if_open(stream: TcpStream) -> io::Result<Option<TcpStream>> {
    // The std socket stays non-blocking, so peeking never waits
    let stream = stream.into_std()?;
    let mut buf = [0u8; 1];
    let open = match stream.peek(&mut buf) {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
        Err(_) => false,
    };

    if open {
        Ok(Some(TcpStream::from_std(stream)?))
    } else {
        Ok(None)
    }
}

async fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    Ok(OpenOptions::new().create(true).append(true).open(path).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_record_layout() {
        let event = Event::new("resource_creation_succeeded", "VM created")
            .with_level(LogLevel::Warning)
            .with_context("resource_name", "vm-1");

        let record = event.to_record();
        assert_eq!(record["event_type"], "resource_creation_succeeded");
        assert_eq!(record["levelname"], "WARNING");
        assert_eq!(record["message"], "VM created");
        assert_eq!(record["context"]["resource_name"], "vm-1");
        assert_eq!(record["uuid"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn test_delivery_delivered() {
        assert!(!Delivery::default().delivered());
        assert!(Delivery { hooks: 1, ..Delivery::default() }.delivered());
    }

    #[tokio::test]
    async fn test_logserver_sink_unreachable() {
        let sink = LogServerSink::new("127.0.0.1:1".to_string());
        assert!(sink.send("{}").await.is_err());
    }
}
