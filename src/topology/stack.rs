//! Two-service test stack
//!
//! Builds the stack the platform's test suite runs in: a PostgreSQL `db`
//! container and an `api` container that bind-mounts the repository,
//! joined by a private bridge network.

use std::collections::BTreeMap;

use serde_yaml::Value;

use super::compose::{BuildSpec, ComposeFile, Environment, NetworkSpec, ServiceSpec, MTU_OPTION};
use crate::config::PostgresConfig;

pub const DB_SERVICE: &str = "db";
pub const API_SERVICE: &str = "api";

/// Knobs of the generated stack
#[derive(Debug, Clone)]
pub struct StackOptions {
    pub network: String,
    pub mtu: u32,
    pub api_port: u16,
    /// Host side of the repository bind mount
    pub mount_source: String,
    pub mount_target: String,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            network: "waldur".to_string(),
            mtu: 1450,
            api_port: 8000,
            mount_source: "../".to_string(),
            mount_target: "/mnt".to_string(),
        }
    }
}

/// Test stack with default options
pub fn test_stack(postgres: &PostgresConfig) -> ComposeFile {
    test_stack_with(postgres, &StackOptions::default())
}

/// Test stack; the database container is provisioned with the
/// `[postgresql]` name, user and password
pub fn test_stack_with(postgres: &PostgresConfig, options: &StackOptions) -> ComposeFile {
    let db = ServiceSpec {
        build: Some(BuildSpec::Context("./db".to_string())),
        environment: Environment::List(vec![
            format!("POSTGRESQL_DATABASE={}", postgres.name),
            format!("POSTGRESQL_USER={}", postgres.user),
            format!("POSTGRESQL_PASSWORD={}", postgres.password),
        ]),
        networks: vec![options.network.clone()].into(),
        ..ServiceSpec::default()
    };

    let api = ServiceSpec {
        build: Some(BuildSpec::Context("./api".to_string())),
        ports: vec![format!("{}:{}", options.api_port, options.api_port)],
        volumes: vec![format!("{}:{}", options.mount_source, options.mount_target)],
        links: vec![DB_SERVICE.to_string()],
        depends_on: vec![DB_SERVICE.to_string()].into(),
        networks: vec![options.network.clone()].into(),
        ..ServiceSpec::default()
    };

    let network = NetworkSpec {
        driver: Some("bridge".to_string()),
        driver_opts: BTreeMap::from([(MTU_OPTION.to_string(), Value::String(options.mtu.to_string()))]),
    };

    ComposeFile {
        version: Some("2".to_string()),
        services: BTreeMap::from([(DB_SERVICE.to_string(), db), (API_SERVICE.to_string(), api)]),
        networks: BTreeMap::from([(options.network.clone(), network)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_stack_provisions_database_from_settings() {
        let mut postgres = Settings::default().postgresql;
        postgres.name = "waldur_test".to_string();
        postgres.password = "pw".to_string();

        let stack = test_stack(&postgres);
        let env = stack.services[DB_SERVICE].environment_map();
        assert_eq!(env["POSTGRESQL_DATABASE"], "waldur_test");
        assert_eq!(env["POSTGRESQL_USER"], "waldur");
        assert_eq!(env["POSTGRESQL_PASSWORD"], "pw");
    }

    #[test]
    fn test_stack_wiring() {
        let stack = test_stack(&Settings::default().postgresql);
        let api = &stack.services[API_SERVICE];
        assert_eq!(api.volumes, vec!["../:/mnt".to_string()]);
        assert_eq!(api.links, vec!["db".to_string()]);
        assert_eq!(api.ports, vec!["8000:8000".to_string()]);
        assert_eq!(stack.networks["waldur"].mtu(), Some(1450));
        assert_eq!(stack.networks["waldur"].driver.as_deref(), Some("bridge"));
        assert!(stack.validate().is_ok());
        assert_eq!(stack.startup_order().unwrap(), vec!["db".to_string(), "api".to_string()]);
    }
}
