//! Error reporting to Sentry
//!
//! Parses the `[sentry] dsn` setting and reports messages to the Sentry
//! store endpoint it points at.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::config::{LogLevel, SentryConfig};
use crate::utils::errors::{Result, SettingsError, SettingsResult, WaldurError};

const SENTRY_PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "waldur-settings";

/// Parsed Sentry DSN: `{scheme}://{public_key}[:{secret}]@{host}[:{port}]/[{path}/]{project_id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentryDsn {
    scheme: String,
    public_key: String,
    secret_key: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    project_id: String,
}

impl SentryDsn {
    pub fn parse(raw: &str) -> SettingsResult<Self> {
        let invalid = |message: String| SettingsError::invalid("sentry", "dsn", message);

        let url = Url::parse(raw.trim()).map_err(|e| invalid(format!("not a URL: {}", e)))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", scheme)));
        }

        if url.username().is_empty() {
            return Err(invalid("missing public key".to_string()));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let project_id = segments
            .pop()
            .ok_or_else(|| invalid("missing project id".to_string()))?
            .to_string();
        if !project_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!("project id '{}' is not numeric", project_id)));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            public_key: url.username().to_string(),
            secret_key: url.password().map(str::to_string),
            host,
            port: url.port(),
            path: segments.join("/"),
            project_id,
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    fn path_prefix(&self) -> String {
        if self.path.is_empty() {
            String::new()
        } else {
            format!("/{}", self.path)
        }
    }

    /// Endpoint events are POSTed to
    pub fn store_url(&self) -> String {
        format!("{}{}/api/{}/store/", self.origin(), self.path_prefix(), self.project_id)
    }

    /// Value of the `X-Sentry-Auth` header
    pub fn auth_header(&self, timestamp: i64) -> String {
        let mut header = format!(
            "Sentry sentry_version={}, sentry_client={}/{}, sentry_timestamp={}, sentry_key={}",
            SENTRY_PROTOCOL_VERSION,
            CLIENT_NAME,
            crate::VERSION,
            timestamp,
            self.public_key
        );
        if let Some(secret) = &self.secret_key {
            header.push_str(&format!(", sentry_secret={}", secret));
        }
        header
    }

    /// DSN with the secret key masked
    pub fn redacted(&self) -> String {
        let credentials = match &self.secret_key {
            Some(_) => format!("{}:********", self.public_key),
            None => self.public_key.clone(),
        };
        self.render(&credentials)
    }

    fn render(&self, credentials: &str) -> String {
        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        format!(
            "{}://{}@{}{}/{}",
            self.scheme,
            credentials,
            authority,
            self.path_prefix(),
            self.project_id
        )
    }
}

impl fmt::Display for SentryDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let credentials = match &self.secret_key {
            Some(secret) => format!("{}:{}", self.public_key, secret),
            None => self.public_key.clone(),
        };
        f.write_str(&self.render(&credentials))
    }
}

/// Sentry level name for a settings log level
pub fn sentry_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warning => "warning",
        LogLevel::Error => "error",
        LogLevel::Critical => "fatal",
    }
}

/// Reports messages to Sentry
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    dsn: SentryDsn,
    client: Client,
}

impl ErrorReporter {
    /// Build a reporter when a DSN is configured
    pub fn from_config(config: &SentryConfig) -> Result<Option<Self>> {
        match &config.dsn {
            Some(dsn) => Ok(Some(Self::new(SentryDsn::parse(dsn)?)?)),
            None => Ok(None),
        }
    }

    pub fn new(dsn: SentryDsn) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { dsn, client })
    }

    pub fn dsn(&self) -> &SentryDsn {
        &self.dsn
    }

    /// Send a message event, returning its event id
    pub async fn capture_message(&self, message: &str, level: LogLevel) -> Result<Uuid> {
        let event_id = Uuid::new_v4();
        let now = Utc::now();
        let payload = json!({
            "event_id": event_id.simple().to_string(),
            "timestamp": now.to_rfc3339(),
            "level": sentry_level(level),
            "platform": "other",
            "logger": "waldur",
            "message": { "formatted": message },
            "sdk": { "name": CLIENT_NAME, "version": crate::VERSION },
        });

        debug!(event_id = %event_id, url = %self.dsn.store_url(), "Sending event to Sentry");
        let response = self
            .client
            .post(self.dsn.store_url())
            .header("X-Sentry-Auth", self.dsn.auth_header(now.timestamp()))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WaldurError::Reporting(format!(
                "Sentry rejected event {} with status {}",
                event_id, status
            )));
        }

        info!(event_id = %event_id, level = %level, "Event reported to Sentry");
        Ok(event_id)
    }
}
