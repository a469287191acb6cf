//! Utility modules
//!
//! This module contains common utilities used throughout the crate,
//! including error handling, logging setup, and helper functions.

pub mod errors;
pub mod helpers;
pub mod logging;
pub mod syslog;

pub use errors::{Result, SettingsError, TopologyError, WaldurError};
