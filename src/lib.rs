//! Waldur settings
//!
//! Typed loader and validator for the Waldur platform settings file, with
//! connectivity probes for the backends it configures and a model of the
//! container test stack the platform is exercised in.

pub mod config;
pub mod database;
pub mod services;
pub mod topology;
pub mod utils;

// Re-export commonly used types
pub use config::{Settings, SettingsLoader};
pub use utils::errors::{Result, SettingsError, TopologyError, WaldurError};

// Re-export main components for easy access
pub use services::{EventLogger, ServiceFactory};
pub use topology::ComposeFile;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
