//! Database module
//!
//! This module handles PostgreSQL connectivity described by `[postgresql]`

pub mod connection;

// Re-export commonly used database components
pub use connection::{connect_options, create_pool, health_check, lazy_pool, probe, DatabasePool, PoolOptions};
