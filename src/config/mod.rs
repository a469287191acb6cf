//! Configuration management module
//!
//! This module handles loading and validation of platform settings
//! from INI files and environment variables.

pub mod schema;
pub mod settings;
pub mod source;
pub mod validation;

pub use schema::{Section, SettingSpec, ValueKind, SETTINGS};
pub use settings::{
    AuthConfig, EventsConfig, GlobalConfig, LogLevel, LoggingConfig, PostgresConfig, RedisConfig,
    SentryConfig, Settings, SettingsLoader,
};
pub use source::IniSource;
