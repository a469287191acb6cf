//! Container orchestration file model
//!
//! A typed subset of the compose file format: services with build context
//! or image, published ports, environment, volumes, links, dependencies and
//! networks, plus bridge networks with driver options.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::utils::errors::{Result, TopologyError};

/// Driver option carrying a bridge network's MTU
pub const MTU_OPTION: &str = "com.docker.network.driver.mtu";

/// Network every service joins when it names none
pub const DEFAULT_NETWORK: &str = "default";

const VOLUME_MODES: &[&str] = &["ro", "rw", "z", "Z", "cached", "delegated", "consistent"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub services: BTreeMap<String, ServiceSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "NameList::is_empty")]
    pub depends_on: NameList,
    #[serde(default, skip_serializing_if = "NameList::is_empty")]
    pub networks: NameList,
}

/// Build context, either as a bare path or with an explicit Dockerfile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildSpec {
    Context(String),
    Detailed {
        context: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dockerfile: Option<String>,
    },
}

impl BuildSpec {
    pub fn context(&self) -> &str {
        match self {
            BuildSpec::Context(context) => context,
            BuildSpec::Detailed { context, .. } => context,
        }
    }
}

/// Service environment in either `KEY=VALUE` list or mapping form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Environment {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::List(Vec::new())
    }
}

impl Environment {
    pub fn is_empty(&self) -> bool {
        match self {
            Environment::List(entries) => entries.is_empty(),
            Environment::Map(entries) => entries.is_empty(),
        }
    }

    /// Variables as a map; entries without a value map to an empty string
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Environment::List(entries) => entries
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (entry.clone(), String::new()),
                })
                .collect(),
            Environment::Map(entries) => entries
                .iter()
                .map(|(key, value)| (key.clone(), scalar_to_string(value)))
                .collect(),
        }
    }
}

/// Service or network names, as a list or as a map of per-name options
///
/// The map form carries e.g. `condition: service_healthy` for
/// dependencies or `aliases` for networks; only the names are used here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NameList {
    List(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl Default for NameList {
    fn default() -> Self {
        NameList::List(Vec::new())
    }
}

impl From<Vec<String>> for NameList {
    fn from(names: Vec<String>) -> Self {
        NameList::List(names)
    }
}

impl NameList {
    pub fn is_empty(&self) -> bool {
        match self {
            NameList::List(names) => names.is_empty(),
            NameList::Map(entries) => entries.is_empty(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            NameList::List(names) => names.iter().map(String::as_str).collect(),
            NameList::Map(entries) => entries.keys().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub driver_opts: BTreeMap<String, Value>,
}

impl NetworkSpec {
    /// Configured MTU, if present and numeric
    pub fn mtu(&self) -> Option<u32> {
        self.driver_opts
            .get(MTU_OPTION)
            .and_then(|value| scalar_to_string(value).parse().ok())
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

impl ServiceSpec {
    pub fn environment_map(&self) -> BTreeMap<String, String> {
        self.environment.to_map()
    }

    /// Services this one must start after: link targets and dependencies
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.links
            .iter()
            .map(|link| link.split(':').next().unwrap_or(link).to_string())
            .chain(self.depends_on.names().into_iter().map(str::to_string))
            .collect()
    }
}

impl ComposeFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check references, volumes, ports and network options
    pub fn validate(&self) -> std::result::Result<(), TopologyError> {
        for (name, service) in &self.services {
            if service.build.is_none() && service.image.is_none() {
                return Err(TopologyError::NoBuildOrImage {
                    service: name.clone(),
                });
            }

            for target in service.dependencies() {
                if !self.services.contains_key(&target) {
                    return Err(TopologyError::UnknownService {
                        service: name.clone(),
                        target,
                    });
                }
            }

            for network in service.networks.names() {
                if network != DEFAULT_NETWORK && !self.networks.contains_key(network) {
                    return Err(TopologyError::UnknownNetwork {
                        service: name.clone(),
                        network: network.to_string(),
                    });
                }
            }

            for volume in &service.volumes {
                validate_volume(volume).map_err(|reason| TopologyError::InvalidVolume {
                    service: name.clone(),
                    volume: volume.clone(),
                    reason,
                })?;
            }

            for port in &service.ports {
                if !is_valid_port_mapping(port) {
                    return Err(TopologyError::InvalidPort {
                        service: name.clone(),
                        port: port.clone(),
                    });
                }
            }
        }

        for (name, network) in &self.networks {
            if let Some(value) = network.driver_opts.get(MTU_OPTION) {
                let raw = scalar_to_string(value);
                match raw.parse::<u32>() {
                    Ok(mtu) if (68..=65_535).contains(&mtu) => {}
                    _ => {
                        return Err(TopologyError::InvalidMtu {
                            network: name.clone(),
                            value: raw,
                        })
                    }
                }
            }
        }

        Ok(())
    }

    /// Service names in an order that starts dependencies first
    ///
    /// Ties are broken alphabetically so the order is stable.
    pub fn startup_order(&self) -> std::result::Result<Vec<String>, TopologyError> {
        let mut pending: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for (name, service) in &self.services {
            let dependencies = service.dependencies();
            if let Some(target) = dependencies.iter().find(|t| !self.services.contains_key(*t)) {
                return Err(TopologyError::UnknownService {
                    service: name.clone(),
                    target: target.clone(),
                });
            }
            pending.insert(name.as_str(), dependencies);
        }

        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                let remaining: Vec<&str> = pending.keys().copied().collect();
                return Err(TopologyError::DependencyCycle(remaining.join(", ")));
            }

            for name in ready {
                pending.remove(name);
                for deps in pending.values_mut() {
                    deps.remove(name);
                }
                order.push(name.to_string());
            }
        }

        Ok(order)
    }
}

fn validate_volume(volume: &str) -> std::result::Result<(), String> {
    let parts: Vec<&str> = volume.split(':').collect();
    match parts.as_slice() {
        [target] => {
            if !target.starts_with('/') {
                return Err("anonymous volume target must be an absolute path".to_string());
            }
        }
        [source, target] | [source, target, _] => {
            if source.is_empty() {
                return Err("source is empty".to_string());
            }
            if !target.starts_with('/') {
                return Err("container path must be absolute".to_string());
            }
            if let [_, _, mode] = parts.as_slice() {
                if !mode.split(',').all(|m| VOLUME_MODES.contains(&m)) {
                    return Err(format!("unknown mode '{}'", mode));
                }
            }
        }
        _ => return Err("expected source:target[:mode]".to_string()),
    }

    Ok(())
}

fn is_valid_port(raw: &str) -> bool {
    matches!(raw.parse::<u16>(), Ok(port) if port > 0)
}

fn is_valid_port_or_range(raw: &str) -> bool {
    match raw.split_once('-') {
        Some((start, end)) => {
            is_valid_port(start)
                && is_valid_port(end)
                && start.parse::<u16>().ok() <= end.parse::<u16>().ok()
        }
        None => is_valid_port(raw),
    }
}

/// `[ip:][host:]container[/protocol]`
fn is_valid_port_mapping(port: &str) -> bool {
    let mapping = match port.rsplit_once('/') {
        Some((mapping, protocol)) => {
            if !matches!(protocol, "tcp" | "udp" | "sctp") {
                return false;
            }
            mapping
        }
        None => port,
    };

    let parts: Vec<&str> = mapping.split(':').collect();
    match parts.as_slice() {
        [container] => is_valid_port_or_range(container),
        [host, container] => is_valid_port_or_range(host) && is_valid_port_or_range(container),
        [ip, host, container] => {
            !ip.is_empty()
                && (host.is_empty() || is_valid_port_or_range(host))
                && is_valid_port_or_range(container)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_forms() {
        let list = Environment::List(vec!["A=1".to_string(), "B".to_string(), "C=x=y".to_string()]);
        let map = list.to_map();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "");
        assert_eq!(map["C"], "x=y");

        let yaml = "A: 1\nB: true\nC: null\n";
        let env: Environment = serde_yaml::from_str(yaml).unwrap();
        let map = env.to_map();
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "true");
        assert_eq!(map["C"], "");
    }

    #[test]
    fn test_volume_validation() {
        assert!(validate_volume("../:/mnt").is_ok());
        assert!(validate_volume("data:/var/lib/pgsql/data:ro").is_ok());
        assert!(validate_volume("/cache").is_ok());
        assert!(validate_volume("../:mnt").is_err());
        assert!(validate_volume(":/mnt").is_err());
        assert!(validate_volume("a:/b:bogus").is_err());
        assert!(validate_volume("a:/b:ro:x").is_err());
    }

    #[test]
    fn test_port_mapping_validation() {
        for port in ["8000", "8000:8000", "127.0.0.1:8000:8000", "127.0.0.1::8000", "5000-5010:5000-5010", "53:53/udp"] {
            assert!(is_valid_port_mapping(port), "{}", port);
        }
        for port in ["0", "70000:80", "8000:8000/http", "a:b", "10-5", "1:2:3:4"] {
            assert!(!is_valid_port_mapping(port), "{}", port);
        }
    }

    #[test]
    fn test_link_alias_is_a_dependency() {
        let service = ServiceSpec {
            links: vec!["db:database".to_string()],
            depends_on: vec!["cache".to_string()].into(),
            ..ServiceSpec::default()
        };
        let deps: Vec<_> = service.dependencies().into_iter().collect();
        assert_eq!(deps, vec!["cache".to_string(), "db".to_string()]);
    }

    #[test]
    fn test_name_list_forms() {
        let list: NameList = serde_yaml::from_str("[db, cache]").unwrap();
        assert_eq!(list.names(), vec!["db", "cache"]);

        let map: NameList =
            serde_yaml::from_str("db:\n  condition: service_healthy\ncache:\n").unwrap();
        assert_eq!(map.names(), vec!["cache", "db"]);
        assert!(NameList::default().is_empty());
    }

    #[test]
    fn test_build_spec_forms() {
        let short: BuildSpec = serde_yaml::from_str("./api").unwrap();
        assert_eq!(short.context(), "./api");

        let long: BuildSpec = serde_yaml::from_str("context: ./api\ndockerfile: Dockerfile.test\n").unwrap();
        assert_eq!(long.context(), "./api");
    }
}
