//! Settings registry
//!
//! Every option the platform recognises is listed once in [`SETTINGS`],
//! together with its section, value domain, documented default and help
//! text. Both the loader's defaults and the annotated template come from
//! this table.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::errors::{SettingsError, SettingsResult};

/// Named grouping of related settings keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Global,
    Auth,
    Logging,
    Events,
    Postgresql,
    Redis,
    Sentry,
}

impl Section {
    /// All sections, in template order
    pub const ALL: [Section; 7] = [
        Section::Global,
        Section::Auth,
        Section::Logging,
        Section::Events,
        Section::Postgresql,
        Section::Redis,
        Section::Sentry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Global => "global",
            Section::Auth => "auth",
            Section::Logging => "logging",
            Section::Events => "events",
            Section::Postgresql => "postgresql",
            Section::Redis => "redis",
            Section::Sentry => "sentry",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Section::Global => "Application-wide options.",
            Section::Auth => "Authentication token and session lifetimes.",
            Section::Logging => "Application log output.",
            Section::Events => "Event log delivery.",
            Section::Postgresql => "PostgreSQL database connection.",
            Section::Redis => "Redis connection used as cache and task queue broker.",
            Section::Sentry => "Error reporting.",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == name)
            .ok_or_else(|| format!("unknown section: {}", s))
    }
}

/// Value domain of a setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Integer,
    Port,
    String,
    Email,
    Path,
    Url,
    LogLevel,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Port => "port",
            ValueKind::String => "string",
            ValueKind::Email => "email",
            ValueKind::Path => "path",
            ValueKind::Url => "url",
            ValueKind::LogLevel => "log level",
        }
    }
}

/// Description of a single recognised setting
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub section: Section,
    pub key: &'static str,
    pub kind: ValueKind,
    /// Documented default; `None` means the option is disabled when unset
    pub default: Option<&'static str>,
    /// Startup is refused while a required value is empty
    pub required: bool,
    pub help: &'static [&'static str],
}

const fn spec(
    section: Section,
    key: &'static str,
    kind: ValueKind,
    default: Option<&'static str>,
    help: &'static [&'static str],
) -> SettingSpec {
    SettingSpec {
        section,
        key,
        kind,
        default,
        required: false,
        help,
    }
}

/// Every recognised setting, grouped by section in template order
pub static SETTINGS: &[SettingSpec] = &[
    spec(Section::Global, "debug", ValueKind::Boolean, Some("false"), &[
        "Enable debug mode. Never enable it in production.",
    ]),
    SettingSpec {
        section: Section::Global,
        key: "secret_key",
        kind: ValueKind::String,
        default: None,
        required: true,
        help: &[
            "Secret key used for cryptographic signing.",
            "Startup is refused while this is empty; generate one with",
            "`waldur-settings generate-secret`.",
        ],
    },
    spec(Section::Global, "static_root", ValueKind::Path, Some("/var/lib/waldur/static"), &[
        "Absolute directory static files are collected into.",
    ]),
    spec(Section::Global, "media_root", ValueKind::Path, Some("/var/lib/waldur/media"), &[
        "Absolute directory user-uploaded files are stored in.",
    ]),
    spec(Section::Global, "default_from_email", ValueKind::Email, None, &[
        "Sender address of outgoing notifications.",
        "Leave empty to use the framework default.",
    ]),
    spec(Section::Global, "owner_can_manage_customer", ValueKind::Boolean, Some("false"), &[
        "Allow customer owners to edit and delete their customers.",
    ]),
    spec(Section::Global, "show_all_users", ValueKind::Boolean, Some("false"), &[
        "Allow any authenticated user to list all users.",
    ]),
    spec(Section::Auth, "token_lifetime", ValueKind::Integer, Some("3600"), &[
        "Seconds an authentication token stays valid after its last use.",
    ]),
    spec(Section::Auth, "session_lifetime", ValueKind::Integer, Some("3600"), &[
        "Seconds a browser session stays valid.",
    ]),
    spec(Section::Logging, "admin_email", ValueKind::Email, None, &[
        "Address unhandled errors are mailed to. Leave empty to disable.",
    ]),
    spec(Section::Logging, "log_file", ValueKind::Path, None, &[
        "File application logs are appended to. Leave empty to disable.",
    ]),
    spec(Section::Logging, "log_level", ValueKind::LogLevel, Some("INFO"), &[
        "One of DEBUG, INFO, WARNING, ERROR, CRITICAL.",
    ]),
    spec(Section::Logging, "syslog", ValueKind::Boolean, Some("false"), &[
        "Also send application logs to the local syslog socket.",
    ]),
    spec(Section::Events, "log_file", ValueKind::Path, None, &[
        "File events are appended to as JSON lines. Leave empty to disable.",
    ]),
    spec(Section::Events, "logserver_host", ValueKind::String, None, &[
        "Log server receiving events as JSON lines over TCP.",
        "Leave empty to disable.",
    ]),
    spec(Section::Events, "logserver_port", ValueKind::Port, Some("5959"), &[
        "TCP port of the log server.",
    ]),
    spec(Section::Events, "log_level", ValueKind::LogLevel, Some("INFO"), &[
        "Minimum level of delivered events.",
    ]),
    spec(Section::Events, "syslog", ValueKind::Boolean, Some("false"), &[
        "Also send events to the local syslog socket.",
    ]),
    spec(Section::Events, "hook", ValueKind::Boolean, Some("false"), &[
        "Deliver events to in-process hook subscribers.",
    ]),
    spec(Section::Postgresql, "host", ValueKind::String, None, &[
        "Database server host. Leave empty to connect over the local UNIX socket.",
    ]),
    spec(Section::Postgresql, "port", ValueKind::Port, Some("5432"), &[
        "Database server port.",
    ]),
    spec(Section::Postgresql, "name", ValueKind::String, Some("waldur"), &[
        "Database name.",
    ]),
    spec(Section::Postgresql, "user", ValueKind::String, Some("waldur"), &[
        "Database user.",
    ]),
    spec(Section::Postgresql, "password", ValueKind::String, Some("waldur"), &[
        "Database password.",
    ]),
    spec(Section::Redis, "host", ValueKind::String, Some("localhost"), &[
        "Redis server host.",
    ]),
    spec(Section::Redis, "port", ValueKind::Port, Some("6379"), &[
        "Redis server port.",
    ]),
    spec(Section::Redis, "password", ValueKind::String, None, &[
        "Redis password. Leave empty when the server requires no authentication.",
    ]),
    spec(Section::Sentry, "dsn", ValueKind::Url, None, &[
        "Sentry DSN errors are reported to. Leave empty to disable.",
    ]),
];

/// Look up a setting by section and key
pub fn find(section: Section, key: &str) -> Option<&'static SettingSpec> {
    SETTINGS
        .iter()
        .find(|spec| spec.section == section && spec.key == key)
}

/// All settings of one section, in template order
pub fn keys_in(section: Section) -> impl Iterator<Item = &'static SettingSpec> {
    SETTINGS.iter().filter(move |spec| spec.section == section)
}

/// Parse a boolean the way INI-style configuration traditionally does
pub fn parse_bool(section: &str, key: &str, raw: &str) -> SettingsResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(SettingsError::invalid(
            section,
            key,
            format!("'{}' is not a boolean (use true/false, yes/no, on/off or 1/0)", raw),
        )),
    }
}

/// Parse a non-negative decimal integer
pub fn parse_integer(section: &str, key: &str, raw: &str) -> SettingsResult<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| SettingsError::invalid(section, key, format!("'{}' is not a non-negative integer", raw)))
}

/// Parse a TCP port in the range 1..=65535
pub fn parse_port(section: &str, key: &str, raw: &str) -> SettingsResult<u16> {
    let value = parse_integer(section, key, raw)?;
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(SettingsError::invalid(section, key, "must be between 1 and 65535")),
    }
}

/// Render the annotated settings template
pub fn render_template() -> String {
    let mut out = String::new();
    out.push_str("# Waldur settings\n");
    out.push_str("#\n");
    out.push_str("# Commented lines show each option with its default value.\n");
    out.push_str("# Uncomment a line and edit it to override the default.\n");
    out.push_str("# Any option may also be set through the environment as\n");
    out.push_str("# WALDUR_<SECTION>__<KEY>, e.g. WALDUR_POSTGRESQL__HOST.\n");

    for section in Section::ALL {
        out.push('\n');
        out.push_str(&format!("[{}]\n", section));
        out.push_str(&format!("# {}\n", section.help()));

        for spec in keys_in(section) {
            out.push('\n');
            for line in spec.help {
                out.push_str(&format!("# {}\n", line));
            }
            out.push_str(&format!("# Type: {}\n", spec.kind.as_str()));
            let value = spec.default.unwrap_or("");
            let line = if value.is_empty() {
                format!("{} =", spec.key)
            } else {
                format!("{} = {}", spec.key, value)
            };
            if spec.required {
                out.push_str(&format!("{}\n", line));
            } else {
                out.push_str(&format!("# {}\n", line));
            }
        }
    }

    out
}

/// Return the first (section, key) pair that occurs twice within a section
pub fn find_duplicate_key(text: &str) -> Option<(String, String)> {
    let mut section = String::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_ascii_lowercase();
            continue;
        }

        let key = match line.split_once(|c: char| c == '=' || c == ':') {
            Some((key, _)) => key.trim().to_ascii_lowercase(),
            None => line.to_ascii_lowercase(),
        };

        if !seen.insert((section.clone(), key.clone())) {
            return Some((section, key));
        }
    }

    None
}
