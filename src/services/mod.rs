//! Services module
//!
//! This module contains the backends the settings point at: the database,
//! the Redis broker, event delivery, error reporting and auth lifetimes.

pub mod auth;
pub mod broker;
pub mod events;
pub mod sentry;

// Re-export commonly used services
pub use auth::{generate_token, AuthPolicy};
pub use broker::BrokerService;
pub use events::{Delivery, Event, EventLogger};
pub use sentry::{ErrorReporter, SentryDsn};

use std::sync::Arc;

use crate::config::settings::Settings;
use crate::database::{self, DatabasePool, PoolOptions};
use crate::utils::errors::Result;

/// Service factory wiring every backend from one set of settings
#[derive(Clone)]
pub struct ServiceFactory {
    pub database: DatabasePool,
    pub database_url: String,
    pub broker: BrokerService,
    pub events: Arc<EventLogger>,
    pub error_reporter: Option<ErrorReporter>,
    pub auth: AuthPolicy,
}

impl ServiceFactory {
    /// Create a new ServiceFactory; connections are opened lazily
    pub async fn new(settings: &Settings) -> Result<Self> {
        let database = database::lazy_pool(&settings.postgresql, &PoolOptions::default());
        let broker = BrokerService::new(&settings.redis)?;
        let events = Arc::new(EventLogger::new(&settings.events).await?);
        let error_reporter = ErrorReporter::from_config(&settings.sentry)?;
        let auth = AuthPolicy::from_config(&settings.auth);

        Ok(Self {
            database,
            database_url: settings.postgresql.display_url(),
            broker,
            events,
            error_reporter,
            auth,
        })
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let (database, broker) = tokio::join!(
            database::probe(&self.database, &self.database_url),
            self.broker.health_check()
        );

        ServiceHealthStatus {
            database,
            broker,
            sentry_enabled: self.error_reporter.is_some(),
            events_hook: self.events.hooks_enabled(),
        }
    }
}

/// Service health status
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceHealthStatus {
    pub database: bool,
    pub broker: bool,
    pub sentry_enabled: bool,
    pub events_hook: bool,
}

impl ServiceHealthStatus {
    /// Check if the required backends are reachable
    pub fn is_healthy(&self) -> bool {
        self.database && self.broker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status() {
        let status = ServiceHealthStatus {
            database: true,
            broker: false,
            sentry_enabled: false,
            events_hook: true,
        };
        assert!(!status.is_healthy());

        let status = ServiceHealthStatus { broker: true, ..status };
        assert!(status.is_healthy());
    }
}
