//! Redis broker service
//!
//! The platform uses Redis both as its cache and as the task queue broker.
//! This service opens connections from the `[redis]` section and probes
//! the server.

use std::time::Instant;

use redis::{Client, RedisResult};
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::utils::errors::Result;
use crate::utils::logging::log_backend_probe;

/// Redis broker handle
#[derive(Clone, Debug)]
pub struct BrokerService {
    client: Client,
    display_url: String,
}

impl BrokerService {
    /// Create a new BrokerService; no connection is opened yet
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url())?;
        Ok(Self {
            client,
            display_url: config.display_url(),
        })
    }

    /// Broker URL with the password masked
    pub fn display_url(&self) -> &str {
        &self.display_url
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Health check: PING must answer PONG
    pub async fn health_check(&self) -> bool {
        let started = Instant::now();
        let healthy = match self.get_connection().await {
            Ok(mut conn) => {
                let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
                match result {
                    Ok(response) => {
                        debug!(response = %response, "Redis health check answered");
                        response == "PONG"
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis health check failed");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Redis connection failed");
                false
            }
        };

        log_backend_probe("redis", &self.display_url, healthy, started.elapsed().as_millis() as u64);
        healthy
    }

    /// Value of `redis_version` from `INFO server`
    pub async fn server_version(&self) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let info: String = redis::cmd("INFO").arg("server").query_async(&mut conn).await?;
        Ok(parse_info_field(&info, "redis_version"))
    }
}

/// Extract a `field:value` line from an INFO reply
pub fn parse_info_field(info: &str, field: &str) -> Option<String> {
    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_broker_creation_does_not_connect() {
        let service = BrokerService::new(&Settings::default().redis).unwrap();
        assert_eq!(service.display_url(), "redis://localhost:6379");
    }

    #[test]
    fn test_display_url_hides_password() {
        let mut config = Settings::default().redis;
        config.password = Some("secret".to_string());
        let service = BrokerService::new(&config).unwrap();
        assert!(!service.display_url().contains("secret"));
    }

    #[tokio::test]
    async fn test_health_check_unreachable_server() {
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            password: None,
        };
        let service = BrokerService::new(&config).unwrap();
        assert!(!service.health_check().await);
    }

    #[test]
    fn test_parse_info_field() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_info_field(info, "redis_version"), Some("7.2.4".to_string()));
        assert_eq!(parse_info_field(info, "uptime_in_days"), None);
    }
}
