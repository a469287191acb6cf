//! Database connection management

use std::path::Path;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};

use crate::config::PostgresConfig;
use crate::utils::errors::WaldurError;
use crate::utils::logging::log_backend_probe;

pub type DatabasePool = Pool<Postgres>;

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

/// Connection options from `[postgresql]`; no host means the local socket
pub fn connect_options(config: &PostgresConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .application_name("waldur");

    match &config.host {
        Some(host) => options.host(host),
        None => options.socket(Path::new(PostgresConfig::SOCKET_DIR)),
    }
}

fn pool_options(options: &PoolOptions) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .idle_timeout(options.idle_timeout)
        .max_lifetime(options.max_lifetime)
}

/// Create a new database connection pool and test it
pub async fn create_pool(config: &PostgresConfig, options: &PoolOptions) -> Result<DatabasePool, WaldurError> {
    let pool = pool_options(options)
        .connect_with(connect_options(config))
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    tracing::info!(database = %config.display_url(), "Database connection pool created successfully");
    Ok(pool)
}

/// Create a pool that connects on first use
pub fn lazy_pool(config: &PostgresConfig, options: &PoolOptions) -> DatabasePool {
    pool_options(options).connect_lazy_with(connect_options(config))
}

/// Check database health
pub async fn health_check(pool: &DatabasePool) -> Result<(), WaldurError> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Run a health check and log its outcome
pub async fn probe(pool: &DatabasePool, target: &str) -> bool {
    let started = Instant::now();
    let healthy = match health_check(pool).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };
    log_backend_probe("postgresql", target, healthy, started.elapsed().as_millis() as u64);
    healthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_pool_options_default() {
        let options = PoolOptions::default();
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.min_connections, 0);
        assert_eq!(options.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_connect_options_use_settings() {
        let mut config = Settings::default().postgresql;
        config.host = Some("db".to_string());
        config.port = 6543;

        let options = connect_options(&config);
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "waldur");
        assert_eq!(options.get_database(), Some("waldur"));
    }

    #[tokio::test]
    async fn test_probe_unreachable_database() {
        let mut config = Settings::default().postgresql;
        config.host = Some("127.0.0.1".to_string());
        config.port = 1;

        let options = PoolOptions {
            acquire_timeout: Duration::from_secs(2),
            ..PoolOptions::default()
        };
        let pool = lazy_pool(&config, &options);
        assert!(!probe(&pool, &config.display_url()).await);
    }
}
