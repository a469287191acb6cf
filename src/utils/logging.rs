//! Logging configuration and setup
//!
//! This module provides logging initialization driven by the `[logging]`
//! section and structured logging helpers shared by the services.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LoggingConfig, Settings};
use crate::utils::errors::{Result, WaldurError};

/// Syslog tag of application logs
pub const SYSLOG_TAG: &str = "waldur";

/// Keeps background log writers alive; drop it on shutdown to flush
#[must_use]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.filter_directive()))
}

/// Split a log file path into its directory and file name
pub fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| WaldurError::Logging(format!("'{}' does not name a file", path.display())))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((dir, name.to_string()))
}

/// Initialize logging based on configuration
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut guards = Vec::new();
    let mut pending_warnings = Vec::new();

    let file_layer = match &config.log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let syslog_layer = if config.syslog {
        match crate::utils::syslog::SyslogWriter::connect(SYSLOG_TAG) {
            Ok(writer) => Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .without_time(),
            ),
            Err(e) => {
                pending_warnings.push(format!("syslog unavailable: {}", e));
                None
            }
        }
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(file_layer)
        .with(syslog_layer)
        .try_init()
        .map_err(|e| WaldurError::Logging(e.to_string()))?;

    for message in pending_warnings {
        warn!("{}", message);
    }
    info!(
        level = %config.log_level,
        file = ?config.log_file,
        syslog = config.syslog,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guards: guards })
}

/// Log a summary of resolved settings without secrets
pub fn log_settings_loaded(settings: &Settings) {
    info!(
        debug = settings.global.debug,
        database = %settings.postgresql.display_url(),
        broker = %settings.redis.display_url(),
        events_logserver = ?settings.events.logserver_address(),
        sentry_enabled = settings.sentry.dsn.is_some(),
        "Settings loaded"
    );
}

/// Log the outcome of a backend connectivity probe
pub fn log_backend_probe(backend: &str, target: &str, healthy: bool, duration_ms: u64) {
    if healthy {
        debug!(
            backend = backend,
            target = target,
            duration_ms = duration_ms,
            "Backend probe succeeded"
        );
    } else {
        warn!(
            backend = backend,
            target = target,
            duration_ms = duration_ms,
            "Backend probe failed"
        );
    }
}

/// Log a failed event delivery
pub fn log_event_delivery_failure(sink: &str, event_type: &str, error: &str) {
    warn!(
        sink = sink,
        event_type = event_type,
        error = error,
        "Event delivery failed"
    );
}
