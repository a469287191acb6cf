//! Settings validation module
//!
//! This module checks resolved settings for values the platform cannot
//! start with. The first failing rule is reported.

use std::path::Path;

use super::settings::{AuthConfig, EventsConfig, GlobalConfig, LoggingConfig, PostgresConfig, RedisConfig, SentryConfig};
use super::Settings;
use crate::services::sentry::SentryDsn;
use crate::utils::errors::{SettingsError, SettingsResult};
use crate::utils::helpers::is_valid_email;

/// Validate all settings
pub fn validate_settings(settings: &Settings) -> SettingsResult<()> {
    validate_global_config(&settings.global)?;
    validate_auth_config(&settings.auth)?;
    validate_logging_config(&settings.logging)?;
    validate_events_config(&settings.events)?;
    validate_postgres_config(&settings.postgresql)?;
    validate_redis_config(&settings.redis)?;
    validate_sentry_config(&settings.sentry)?;

    Ok(())
}

/// Validate `[global]`
fn validate_global_config(config: &GlobalConfig) -> SettingsResult<()> {
    if config.secret_key.trim().is_empty() {
        return Err(SettingsError::MissingRequired {
            section: "global".to_string(),
            key: "secret_key".to_string(),
        });
    }

    validate_absolute_dir("global", "static_root", &config.static_root)?;
    validate_absolute_dir("global", "media_root", &config.media_root)?;

    if let Some(email) = &config.default_from_email {
        validate_email("global", "default_from_email", email)?;
    }

    Ok(())
}

/// Validate `[auth]`
fn validate_auth_config(config: &AuthConfig) -> SettingsResult<()> {
    if config.token_lifetime == 0 {
        return Err(SettingsError::invalid("auth", "token_lifetime", "must be greater than 0"));
    }

    if config.session_lifetime == 0 {
        return Err(SettingsError::invalid("auth", "session_lifetime", "must be greater than 0"));
    }

    // chrono durations are signed milliseconds underneath
    let limit = (i64::MAX / 1000) as u64;
    for (key, value) in [("token_lifetime", config.token_lifetime), ("session_lifetime", config.session_lifetime)] {
        if value > limit {
            return Err(SettingsError::invalid("auth", key, format!("must not exceed {} seconds", limit)));
        }
    }

    Ok(())
}

/// Validate `[logging]`
fn validate_logging_config(config: &LoggingConfig) -> SettingsResult<()> {
    if let Some(email) = &config.admin_email {
        validate_email("logging", "admin_email", email)?;
    }

    if let Some(path) = &config.log_file {
        validate_log_file("logging", path)?;
    }

    Ok(())
}

/// Validate `[events]`
fn validate_events_config(config: &EventsConfig) -> SettingsResult<()> {
    if let Some(path) = &config.log_file {
        validate_log_file("events", path)?;
    }

    if let Some(host) = &config.logserver_host {
        if host.contains(char::is_whitespace) || host.contains('/') {
            return Err(SettingsError::invalid(
                "events",
                "logserver_host",
                format!("'{}' is not a host name or address", host),
            ));
        }
    }

    Ok(())
}

/// Validate `[postgresql]`
fn validate_postgres_config(config: &PostgresConfig) -> SettingsResult<()> {
    if config.name.is_empty() {
        return Err(SettingsError::invalid("postgresql", "name", "database name is required"));
    }

    if config.user.is_empty() {
        return Err(SettingsError::invalid("postgresql", "user", "database user is required"));
    }

    Ok(())
}

/// Validate `[redis]`
fn validate_redis_config(config: &RedisConfig) -> SettingsResult<()> {
    if config.host.is_empty() {
        return Err(SettingsError::invalid("redis", "host", "Redis host is required"));
    }

    Ok(())
}

/// Validate `[sentry]`
fn validate_sentry_config(config: &SentryConfig) -> SettingsResult<()> {
    if let Some(dsn) = &config.dsn {
        SentryDsn::parse(dsn)?;
    }

    Ok(())
}

fn validate_absolute_dir(section: &str, key: &str, path: &Path) -> SettingsResult<()> {
    if !path.is_absolute() {
        return Err(SettingsError::invalid(
            section,
            key,
            format!("'{}' must be an absolute path", path.display()),
        ));
    }

    Ok(())
}

fn validate_log_file(section: &str, path: &Path) -> SettingsResult<()> {
    if path.file_name().is_none() {
        return Err(SettingsError::invalid(
            section,
            "log_file",
            format!("'{}' does not name a file", path.display()),
        ));
    }

    Ok(())
}

fn validate_email(section: &str, key: &str, email: &str) -> SettingsResult<()> {
    if !is_valid_email(email) {
        return Err(SettingsError::invalid(
            section,
            key,
            format!("'{}' is not an e-mail address", email),
        ));
    }

    Ok(())
}
