//! Application settings management
//!
//! This module defines the typed settings structure and the loader that
//! layers an INI settings file, environment variables and explicit
//! overrides on top of the documented defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ::config::{Config, Environment};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::schema::{self, Section};
use super::source::IniSource;
use crate::utils::errors::{Result, SettingsError, SettingsResult};
use crate::utils::helpers::mask_secret;

/// Settings file read when no path is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/waldur/core.ini";

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "WALDUR_CONFIG";

/// Prefix of environment overrides, e.g. `WALDUR_POSTGRESQL__HOST`
pub const ENV_PREFIX: &str = "WALDUR";

/// `CONFIG_PATH_ENV` as seen by the environment source after the prefix
const CONFIG_PATH_KEY: &str = "config";

/// Main settings structure, one field per section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    pub global: GlobalConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
    pub postgresql: PostgresConfig,
    pub redis: RedisConfig,
    pub sentry: SentryConfig,
}

/// `[global]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GlobalConfig {
    pub debug: bool,
    pub secret_key: String,
    pub static_root: PathBuf,
    pub media_root: PathBuf,
    pub default_from_email: Option<String>,
    pub owner_can_manage_customer: bool,
    pub show_all_users: bool,
}

/// `[auth]` section, lifetimes in seconds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    pub token_lifetime: u64,
    pub session_lifetime: u64,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub admin_email: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_level: LogLevel,
    pub syslog: bool,
}

/// `[events]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventsConfig {
    pub log_file: Option<PathBuf>,
    pub logserver_host: Option<String>,
    pub logserver_port: u16,
    pub log_level: LogLevel,
    pub syslog: bool,
    pub hook: bool,
}

/// `[postgresql]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PostgresConfig {
    /// `None` connects over the local UNIX socket
    pub host: Option<String>,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

/// `[redis]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

/// `[sentry]` section
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SentryConfig {
    pub dsn: Option<String>,
}

/// Log verbosity as written in settings files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Closest tracing level; CRITICAL has no counterpart and maps to ERROR
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }

    /// RFC 3164 severity code
    pub fn syslog_severity(&self) -> u8 {
        match self {
            LogLevel::Debug => 7,
            LogLevel::Info => 6,
            LogLevel::Warning => 4,
            LogLevel::Error => 3,
            LogLevel::Critical => 2,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(format!(
                "'{}' is not a log level (use DEBUG, INFO, WARNING, ERROR or CRITICAL)",
                s
            )),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_lifetime)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_lifetime)
    }
}

impl EventsConfig {
    /// `host:port` of the log server, when one is configured
    pub fn logserver_address(&self) -> Option<String> {
        self.logserver_host
            .as_ref()
            .map(|host| format!("{}:{}", host, self.logserver_port))
    }
}

impl PostgresConfig {
    /// Socket directory used when no host is configured
    pub const SOCKET_DIR: &'static str = "/var/run/postgresql";

    /// Connection URL with the password masked, for display only
    pub fn display_url(&self) -> String {
        match &self.host {
            Some(host) => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user,
                mask_secret(&self.password),
                host,
                self.port,
                self.name
            ),
            None => format!(
                "postgresql://{}:{}@/{}?host={}&port={}",
                self.user,
                mask_secret(&self.password),
                self.name,
                Self::SOCKET_DIR,
                self.port
            ),
        }
    }
}

impl RedisConfig {
    /// Broker URL in the `redis://[:password@]host:port` form
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}",
                urlencoding::encode(password),
                self.host,
                self.port
            ),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }

    pub fn display_url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}", mask_secret(password), self.host, self.port),
            None => self.url(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, `$WALDUR_CONFIG` or the default location,
    /// then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::loader(path).load()
    }

    /// Loader reading the settings file the platform would read
    pub fn loader(path: Option<&Path>) -> SettingsLoader {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match std::env::var(CONFIG_PATH_ENV) {
                Ok(path) if !path.trim().is_empty() => (PathBuf::from(path), true),
                _ => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
            },
        };

        SettingsLoader::new()
            .source_file(path, required)
            .env_prefix(ENV_PREFIX)
    }

    /// Resolve settings from INI text alone
    pub fn from_ini_str(text: &str) -> Result<Self> {
        SettingsLoader::new().ini_str(text).load()
    }

    /// Validate settings, refusing the ones the platform cannot start with
    pub fn validate(&self) -> Result<()> {
        super::validation::validate_settings(self)?;
        Ok(())
    }

    /// Copy with every secret masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.global.secret_key = mask_secret(&self.global.secret_key);
        copy.postgresql.password = mask_secret(&self.postgresql.password);
        copy.redis.password = self.redis.password.as_deref().map(mask_secret);
        copy.sentry.dsn = self.sentry.dsn.as_deref().map(|dsn| {
            crate::services::sentry::SentryDsn::parse(dsn)
                .map(|parsed| parsed.redacted())
                .unwrap_or_else(|_| mask_secret(dsn))
        });
        copy
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            global: GlobalConfig {
                debug: false,
                secret_key: String::new(),
                static_root: PathBuf::from("/var/lib/waldur/static"),
                media_root: PathBuf::from("/var/lib/waldur/media"),
                default_from_email: None,
                owner_can_manage_customer: false,
                show_all_users: false,
            },
            auth: AuthConfig {
                token_lifetime: 3600,
                session_lifetime: 3600,
            },
            logging: LoggingConfig {
                admin_email: None,
                log_file: None,
                log_level: LogLevel::Info,
                syslog: false,
            },
            events: EventsConfig {
                log_file: None,
                logserver_host: None,
                logserver_port: 5959,
                log_level: LogLevel::Info,
                syslog: false,
                hook: false,
            },
            postgresql: PostgresConfig {
                host: None,
                port: 5432,
                name: "waldur".to_string(),
                user: "waldur".to_string(),
                password: "waldur".to_string(),
            },
            redis: RedisConfig {
                host: "localhost".to_string(),
                port: 6379,
                password: None,
            },
            sentry: SentryConfig { dsn: None },
        }
    }
}

/// Layered settings builder
#[derive(Debug, Clone, Default)]
pub struct SettingsLoader {
    file: Option<(PathBuf, bool)>,
    text: Option<String>,
    env_prefix: Option<String>,
    overrides: Vec<(String, String)>,
    strict: bool,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a file that must exist
    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.source_file(path, true)
    }

    /// Read settings from a file; a missing optional file is skipped
    pub fn source_file(mut self, path: impl Into<PathBuf>, required: bool) -> Self {
        self.file = Some((path.into(), required));
        self
    }

    /// Read settings from INI text, applied after the file
    pub fn ini_str(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Apply `<PREFIX>_<SECTION>__<KEY>` environment variables
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Override a single `section.key`, applied last
    pub fn set_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Reject unknown sections and keys instead of warning about them
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn load(self) -> Result<Settings> {
        let mut texts: Vec<(String, String)> = Vec::new();

        if let Some((path, required)) = &self.file {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    debug!(path = %path.display(), "Settings file read");
                    texts.push((path.display().to_string(), text));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                    debug!(path = %path.display(), "Optional settings file not found, using defaults");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SettingsError::FileNotFound(path.display().to_string()).into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(text) = self.text {
            texts.push(("<settings text>".to_string(), text));
        }

        let mut builder = Config::builder();
        for (origin, text) in &texts {
            if let Some((section, key)) = schema::find_duplicate_key(text) {
                return Err(SettingsError::DuplicateKey { section, key }.into());
            }
            builder = builder.add_source(IniSource::parse(text, origin)?);
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        for (key, value) in &self.overrides {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }

        let config = builder.build()?;
        check_unknown_keys(&config, self.strict)?;
        let settings = resolve(&config)?;

        debug!(
            database = %settings.postgresql.display_url(),
            broker = %settings.redis.display_url(),
            "Settings resolved"
        );
        Ok(settings)
    }
}

fn check_unknown_keys(config: &Config, strict: bool) -> Result<()> {
    let root: HashMap<String, ::config::Value> = config.clone().try_deserialize()?;
    let mut names: Vec<_> = root.into_iter().collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, value) in names {
        let Ok(table) = value.into_table() else {
            // WALDUR_CONFIG lands here through the environment source
            if name == CONFIG_PATH_KEY {
                continue;
            }
            if strict {
                return Err(SettingsError::KeyOutsideSection(name).into());
            }
            warn!(key = %name, "Ignoring setting outside any section");
            continue;
        };

        let section = match name.parse::<Section>() {
            Ok(section) => section,
            Err(_) => {
                if strict {
                    return Err(SettingsError::UnknownSection(name).into());
                }
                warn!(section = %name, "Ignoring unknown settings section");
                continue;
            }
        };

        let mut keys: Vec<_> = table.into_keys().collect();
        keys.sort();
        for key in keys {
            if schema::find(section, &key).is_some() {
                continue;
            }
            if strict {
                return Err(SettingsError::UnknownKey {
                    section: section.to_string(),
                    key,
                }
                .into());
            }
            warn!(section = %section, key = %key, "Ignoring unknown setting");
        }
    }

    Ok(())
}

/// Typed access to raw values with registry defaults applied
struct Lookup<'a> {
    config: &'a Config,
}

impl Lookup<'_> {
    fn raw(&self, section: Section, key: &str) -> SettingsResult<Option<String>> {
        let spec = schema::find(section, key).ok_or_else(|| SettingsError::UnknownKey {
            section: section.to_string(),
            key: key.to_string(),
        })?;

        let value = match self.config.get_string(&format!("{}.{}", section, key)) {
            Ok(value) => Some(value),
            Err(::config::ConfigError::NotFound(_)) => None,
            Err(e) => return Err(SettingsError::invalid(section.as_str(), key, e.to_string())),
        };

        // Empty values mean "unset" so the documented default applies
        let value = value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(value.or_else(|| spec.default.map(str::to_string)))
    }

    fn optional(&self, section: Section, key: &str) -> SettingsResult<Option<String>> {
        self.raw(section, key)
    }

    fn string(&self, section: Section, key: &str) -> SettingsResult<String> {
        Ok(self.raw(section, key)?.unwrap_or_default())
    }

    fn path(&self, section: Section, key: &str) -> SettingsResult<Option<PathBuf>> {
        Ok(self.raw(section, key)?.map(PathBuf::from))
    }

    fn boolean(&self, section: Section, key: &str) -> SettingsResult<bool> {
        match self.raw(section, key)? {
            Some(raw) => schema::parse_bool(section.as_str(), key, &raw),
            None => Ok(false),
        }
    }

    fn integer(&self, section: Section, key: &str) -> SettingsResult<u64> {
        match self.raw(section, key)? {
            Some(raw) => schema::parse_integer(section.as_str(), key, &raw),
            None => Err(SettingsError::MissingRequired {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn port(&self, section: Section, key: &str) -> SettingsResult<u16> {
        match self.raw(section, key)? {
            Some(raw) => schema::parse_port(section.as_str(), key, &raw),
            None => Err(SettingsError::MissingRequired {
                section: section.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn level(&self, section: Section, key: &str) -> SettingsResult<LogLevel> {
        match self.raw(section, key)? {
            Some(raw) => raw
                .parse()
                .map_err(|message: String| SettingsError::invalid(section.as_str(), key, message)),
            None => Ok(LogLevel::Info),
        }
    }
}

fn resolve(config: &Config) -> SettingsResult<Settings> {
    let values = Lookup { config };

    let global = GlobalConfig {
        debug: values.boolean(Section::Global, "debug")?,
        secret_key: values.string(Section::Global, "secret_key")?,
        static_root: PathBuf::from(values.string(Section::Global, "static_root")?),
        media_root: PathBuf::from(values.string(Section::Global, "media_root")?),
        default_from_email: values.optional(Section::Global, "default_from_email")?,
        owner_can_manage_customer: values.boolean(Section::Global, "owner_can_manage_customer")?,
        show_all_users: values.boolean(Section::Global, "show_all_users")?,
    };

    let auth = AuthConfig {
        token_lifetime: values.integer(Section::Auth, "token_lifetime")?,
        session_lifetime: values.integer(Section::Auth, "session_lifetime")?,
    };

    let logging = LoggingConfig {
        admin_email: values.optional(Section::Logging, "admin_email")?,
        log_file: values.path(Section::Logging, "log_file")?,
        log_level: values.level(Section::Logging, "log_level")?,
        syslog: values.boolean(Section::Logging, "syslog")?,
    };

    let events = EventsConfig {
        log_file: values.path(Section::Events, "log_file")?,
        logserver_host: values.optional(Section::Events, "logserver_host")?,
        logserver_port: values.port(Section::Events, "logserver_port")?,
        log_level: values.level(Section::Events, "log_level")?,
        syslog: values.boolean(Section::Events, "syslog")?,
        hook: values.boolean(Section::Events, "hook")?,
    };

    let postgresql = PostgresConfig {
        host: values.optional(Section::Postgresql, "host")?,
        port: values.port(Section::Postgresql, "port")?,
        name: values.string(Section::Postgresql, "name")?,
        user: values.string(Section::Postgresql, "user")?,
        password: values.string(Section::Postgresql, "password")?,
    };

    let redis = RedisConfig {
        host: values.string(Section::Redis, "host")?,
        port: values.port(Section::Redis, "port")?,
        password: values.optional(Section::Redis, "password")?,
    };

    let sentry = SentryConfig {
        dsn: values.optional(Section::Sentry, "dsn")?,
    };

    Ok(Settings {
        global,
        auth,
        logging,
        events,
        postgresql,
        redis,
        sentry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_registry() {
        let empty = Config::builder().build().unwrap();
        assert_eq!(resolve(&empty).unwrap(), Settings::default());

        let settings = Settings::default();
        assert!(!settings.global.debug);
        assert!(settings.global.secret_key.is_empty());
        assert_eq!(settings.global.static_root, PathBuf::from("/var/lib/waldur/static"));
        assert_eq!(settings.auth.token_lifetime, 3600);
        assert_eq!(settings.auth.session_ttl(), Duration::from_secs(3600));
        assert_eq!(settings.logging.log_level, LogLevel::Info);
        assert_eq!(settings.logging.log_file, None);
        assert_eq!(settings.events.logserver_port, 5959);
        assert_eq!(settings.events.logserver_address(), None);
        assert_eq!(settings.postgresql.host, None);
        assert_eq!(settings.postgresql.port, 5432);
        assert_eq!(settings.postgresql.name, "waldur");
        assert_eq!(settings.redis.host, "localhost");
        assert_eq!(settings.redis.password, None);
        assert_eq!(settings.sentry.dsn, None);
    }

    #[test]
    fn test_log_level_parsing_and_ordering() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Critical);
        assert_eq!(LogLevel::Critical.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warning.filter_directive(), "warn");
    }

    #[test]
    fn test_redis_url_encodes_password() {
        let config = RedisConfig {
            host: "broker".to_string(),
            port: 6380,
            password: Some("p@ss word".to_string()),
        };
        assert_eq!(config.url(), "redis://:p%40ss%20word@broker:6380");
        assert!(!config.display_url().contains("p@ss"));

        let config = RedisConfig {
            password: None,
            ..config
        };
        assert_eq!(config.url(), "redis://broker:6380");
    }

    #[test]
    fn test_postgres_display_url_masks_password() {
        let mut config = Settings::default().postgresql;
        config.password = "hunter2".to_string();
        assert!(!config.display_url().contains("hunter2"));
        assert!(config.display_url().contains("host=/var/run/postgresql"));

        config.host = Some("db".to_string());
        assert!(config.display_url().ends_with("@db:5432/waldur"));
    }
}
