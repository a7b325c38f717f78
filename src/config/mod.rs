//! Flat dotted-key configuration loaded from properties and JSON files.

pub mod settings;

use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use serde_json::Value;
use tracing::{debug, info};

pub use settings::Settings;

use crate::error::ConfigError;

#[derive(Parser)]
#[grammar = "config/properties.pest"]
struct PropertiesParser;

/// String settings keyed by dotted names such as `hummingbird.csv.separator`.
///
/// Sources are merged in order, so later sources override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    values: IndexMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Configuration::default()
    }

    /// Merges every existing file of `locations`, in order. Files ending in
    /// `.json` are read as JSON, anything else as properties. Missing files
    /// are skipped.
    pub fn load<P: AsRef<Path>>(locations: &[P]) -> Result<Self, ConfigError> {
        let mut configuration = Configuration::new();
        for location in locations {
            configuration.merge_file(location.as_ref())?;
        }
        Ok(configuration)
    }

    /// Returns `false` when the file does not exist.
    pub fn merge_file(&mut self, path: &Path) -> Result<bool, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "configuration file not found, skipping");
                return Ok(false);
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            self.merge_json_str(&text)?;
        } else {
            self.merge_properties_str(&text)?;
        }
        info!(path = %path.display(), keys = self.len(), "loaded configuration");
        Ok(true)
    }

    pub fn merge_properties_str(&mut self, text: &str) -> Result<&mut Self, ConfigError> {
        let document = PropertiesParser::parse(Rule::properties, text)
            .map_err(|e| ConfigError::Properties(e.to_string()))?;
        for entry in document.flatten().filter(|pair| pair.as_rule() == Rule::entry) {
            let mut parts = entry.into_inner();
            let key = parts.next().map(unescape).unwrap_or_default();
            let value = parts.next().map(unescape).unwrap_or_default();
            self.values.insert(key, value);
        }
        Ok(self)
    }

    /// Flattens a JSON object into dotted keys. Arrays of scalars become one
    /// comma-joined value; objects inside arrays are flattened under the
    /// array's key.
    pub fn merge_json_str(&mut self, text: &str) -> Result<&mut Self, ConfigError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(object) => {
                for (key, value) in &object {
                    self.flatten_json(key, value);
                }
                Ok(self)
            }
            _ => Err(ConfigError::JsonRoot),
        }
    }

    fn flatten_json(&mut self, key: &str, value: &Value) {
        match value {
            Value::Object(object) => {
                for (child, value) in object {
                    self.flatten_json(&format!("{key}.{child}"), value);
                }
            }
            Value::Array(items) => {
                let mut scalars = Vec::new();
                for item in items {
                    match item {
                        Value::Object(_) | Value::Array(_) => self.flatten_json(key, item),
                        scalar => scalars.push(scalar_text(scalar)),
                    }
                }
                if !scalars.is_empty() {
                    self.values.insert(key.to_string(), scalars.join(","));
                }
            }
            scalar => {
                self.values.insert(key.to_string(), scalar_text(scalar));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// `Ok(None)` when the key is missing, an error when the value does not
    /// parse as `T`.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| parse_value(key, value.trim()))
            .transpose()
    }

    /// Comma-separated items, trimmed. Missing keys and empty values give an
    /// empty list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(value) if !value.trim().is_empty() => {
                value.split(',').map(|item| item.trim().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn get_list_parsed<T>(&self, key: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get_list(key)
            .iter()
            .map(|item| parse_value(key, item))
            .collect()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set_list<I>(&mut self, key: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let joined = values
            .into_iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.set(key, joined)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Writes every entry as `key=value`, escaping what the properties
    /// grammar would otherwise misread.
    pub fn save_properties(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut text = String::new();
        for (key, value) in &self.values {
            text.push_str(&escape(key, true));
            text.push('=');
            text.push_str(&escape(value, false));
            text.push('\n');
        }
        fs::write(path, text).map_err(io_error)
    }
}

/// `<config dir>/hummingbird/hummingbird.properties`, when the platform has a
/// config directory.
pub fn default_location() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hummingbird").join("hummingbird.properties"))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn unescape(pair: Pair<'_, Rule>) -> String {
    let mut text = String::new();
    for part in pair.into_inner() {
        let raw = part.as_str();
        match part.as_rule() {
            Rule::escape => {
                let escaped = &raw[1..];
                match escaped {
                    "t" => text.push('\t'),
                    "n" => text.push('\n'),
                    "r" => text.push('\r'),
                    "f" => text.push('\u{0C}'),
                    _ if escaped.len() == 5 && escaped.starts_with('u') => {
                        let decoded = u32::from_str_radix(&escaped[1..], 16)
                            .ok()
                            .and_then(char::from_u32)
                            .unwrap_or(char::REPLACEMENT_CHARACTER);
                        text.push(decoded);
                    }
                    other => text.push_str(other),
                }
            }
            Rule::continuation => {}
            _ => text.push_str(raw),
        }
    }
    text
}

fn escape(text: &str, is_key: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for (i, ch) in text.chars().enumerate() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{0C}' => escaped.push_str("\\f"),
            '=' | ':' if is_key => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' ' if is_key || i == 0 => escaped.push_str("\\ "),
            '#' | '!' if i == 0 => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}
