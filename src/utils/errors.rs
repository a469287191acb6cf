//! Error handling for waldur-settings
//!
//! This module defines the main error types used throughout the crate
//! and provides a unified error handling strategy.

use thiserror::Error;

/// Main error type for waldur-settings
#[derive(Error, Debug)]
pub enum WaldurError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Configuration source error: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Error reporting failed: {0}")]
    Reporting(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

/// Errors raised while resolving or validating settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("required setting '{key}' in [{section}] is empty or unset")]
    MissingRequired { section: String, key: String },

    #[error("invalid value for '{key}' in [{section}]: {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },

    #[error("unknown setting '{key}' in [{section}]")]
    UnknownKey { section: String, key: String },

    #[error("unknown settings section [{0}]")]
    UnknownSection(String),

    #[error("setting '{key}' appears more than once in [{section}]")]
    DuplicateKey { section: String, key: String },

    #[error("settings file not found: {0}")]
    FileNotFound(String),

    #[error("malformed settings in {origin}: {message}")]
    Syntax { origin: String, message: String },

    #[error("setting '{0}' is not inside a [section]")]
    KeyOutsideSection(String),
}

impl SettingsError {
    pub(crate) fn invalid(section: &str, key: &str, message: impl Into<String>) -> Self {
        SettingsError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Section and key the error refers to, when it refers to one
    pub fn location(&self) -> Option<(&str, &str)> {
        match self {
            SettingsError::MissingRequired { section, key }
            | SettingsError::InvalidValue { section, key, .. }
            | SettingsError::UnknownKey { section, key }
            | SettingsError::DuplicateKey { section, key } => Some((section.as_str(), key.as_str())),
            SettingsError::UnknownSection(_)
            | SettingsError::FileNotFound(_)
            | SettingsError::Syntax { .. }
            | SettingsError::KeyOutsideSection(_) => None,
        }
    }
}

/// Container topology errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("service '{service}' has neither a build context nor an image")]
    NoBuildOrImage { service: String },

    #[error("service '{service}' references unknown service '{target}'")]
    UnknownService { service: String, target: String },

    #[error("service '{service}' joins undefined network '{network}'")]
    UnknownNetwork { service: String, network: String },

    #[error("service '{service}' has invalid volume '{volume}': {reason}")]
    InvalidVolume {
        service: String,
        volume: String,
        reason: String,
    },

    #[error("service '{service}' has invalid port mapping '{port}'")]
    InvalidPort { service: String, port: String },

    #[error("network '{network}' has invalid MTU: {value}")]
    InvalidMtu { network: String, value: String },

    #[error("dependency cycle between services: {0}")]
    DependencyCycle(String),
}

/// Result type alias for waldur-settings operations
pub type Result<T> = std::result::Result<T, WaldurError>;

/// Result type alias for settings resolution
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

impl WaldurError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            WaldurError::Settings(_) => false,
            WaldurError::Source(_) => false,
            WaldurError::Topology(_) => false,
            WaldurError::Database(_) => true,
            WaldurError::Redis(_) => true,
            WaldurError::Http(_) => true,
            WaldurError::Reporting(_) => true,
            WaldurError::Serialization(_) => false,
            WaldurError::Yaml(_) => false,
            WaldurError::Toml(_) => false,
            WaldurError::Io(_) => true,
            WaldurError::Logging(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WaldurError::Settings(_) => ErrorSeverity::Critical,
            WaldurError::Source(_) => ErrorSeverity::Critical,
            WaldurError::Logging(_) => ErrorSeverity::Critical,
            WaldurError::Topology(_) => ErrorSeverity::Error,
            WaldurError::Reporting(_) => ErrorSeverity::Warning,
            WaldurError::Http(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
