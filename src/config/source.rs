//! Literal INI source
//!
//! Feeds settings text to the `config` builder with every value taken
//! exactly as written: surrounding quotes are kept and backslashes are not
//! escape sequences. Section and key names are case-insensitive.

use ::config::{ConfigError, Map, Source, Value, ValueKind};
use ini::{Ini, ParseOption};

use crate::utils::errors::{SettingsError, SettingsResult};

/// Parsed settings text, ready to be layered by `config::ConfigBuilder`
#[derive(Debug, Clone)]
pub struct IniSource {
    values: Map<String, Value>,
}

impl IniSource {
    /// Parse `text`; `origin` names the file or input in error messages
    pub fn parse(text: &str, origin: &str) -> SettingsResult<Self> {
        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(text, options).map_err(|e| SettingsError::Syntax {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;

        let origin = origin.to_string();
        let mut values: Map<String, Value> = Map::new();
        for (section, properties) in ini.iter() {
            let entries = properties.iter().map(|(key, value)| {
                (
                    key.trim().to_ascii_lowercase(),
                    Value::new(Some(&origin), ValueKind::String(value.to_string())),
                )
            });

            match section {
                Some(section) => {
                    let name = section.trim().to_ascii_lowercase();
                    // A section may be opened more than once
                    let mut table = values
                        .remove(&name)
                        .and_then(|existing| existing.into_table().ok())
                        .unwrap_or_default();
                    table.extend(entries);
                    values.insert(name, Value::new(Some(&origin), ValueKind::Table(table)));
                }
                // Keys before the first header stay at the top level
                None => values.extend(entries),
            }
        }

        Ok(Self { values })
    }
}

impl Source for IniSource {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        Ok(self.values.clone())
    }
}
