//! Backend connectivity integration tests
//!
//! The PostgreSQL test needs a container runtime; run it with
//! `cargo test -- --ignored`.

mod helpers;

use std::time::Duration;

use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres as PostgresImage;

use waldur_settings::config::{PostgresConfig, Settings};
use waldur_settings::database::{self, PoolOptions};
use waldur_settings::services::{BrokerService, ServiceFactory};

fn quick_pool_options() -> PoolOptions {
    PoolOptions {
        max_connections: 1,
        acquire_timeout: Duration::from_secs(2),
        ..PoolOptions::default()
    }
}

#[tokio::test]
async fn test_unreachable_database_is_reported() {
    helpers::init_test_logging();
    let config = PostgresConfig {
        host: Some("127.0.0.1".to_string()),
        port: 1,
        ..Settings::default().postgresql
    };

    assert!(database::create_pool(&config, &quick_pool_options()).await.is_err());

    let pool = database::lazy_pool(&config, &quick_pool_options());
    assert!(!database::probe(&pool, &config.display_url()).await);
}

#[tokio::test]
async fn test_unreachable_broker_is_reported() {
    let mut settings = Settings::default();
    settings.redis.host = "127.0.0.1".to_string();
    settings.redis.port = 1;

    let broker = BrokerService::new(&settings.redis).unwrap();
    assert!(!broker.health_check().await);
    assert!(broker.server_version().await.is_err());
}

#[tokio::test]
async fn test_factory_reports_unhealthy_backends() {
    let settings = Settings::from_ini_str(
        "[global]\nsecret_key = x\n\n[postgresql]\nhost = 127.0.0.1\nport = 1\n\n[redis]\nhost = 127.0.0.1\nport = 1\n\n[events]\nhook = true\n",
    )
    .unwrap();

    let services = ServiceFactory::new(&settings).await.unwrap();
    let status = services.health_check().await;

    assert!(!status.database);
    assert!(!status.broker);
    assert!(status.events_hook);
    assert!(!status.sentry_enabled);
    assert!(!status.is_healthy());
}

#[tokio::test]
#[ignore = "requires a container runtime"]
async fn test_database_probe_against_container() {
    helpers::init_test_logging();
    let container = PostgresImage::default()
        .with_db_name("waldur_test")
        .with_user("waldur")
        .with_password("waldur")
        .start()
        .await
        .expect("Failed to start postgres container");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let config = PostgresConfig {
        host: Some("127.0.0.1".to_string()),
        port,
        name: "waldur_test".to_string(),
        ..Settings::default().postgresql
    };

    let pool = database::create_pool(&config, &PoolOptions::default())
        .await
        .expect("database should be reachable");
    database::health_check(&pool).await.unwrap();
    assert!(database::probe(&pool, &config.display_url()).await);
}
