use std::path::PathBuf;

use super::Configuration;
use crate::data::table::DEFAULT_NULL_DISPLAY;
use crate::error::ConfigError;
use crate::remote::transport::DEFAULT_CONNECT_ATTEMPTS;
use crate::store::CsvDialect;

pub const STAGING_DIR: &str = "hummingbird.persistence.staging-dir";
pub const CSV_SEPARATOR: &str = "hummingbird.csv.separator";
pub const CSV_NEWLINE: &str = "hummingbird.csv.newline";
pub const DISPLAY_NULL: &str = "hummingbird.display.null";
pub const NAME_LENGTH: &str = "hummingbird.namespace.name-length";
pub const CONNECT_ATTEMPTS: &str = "hummingbird.remote.connect-attempts";

pub const DEFAULT_STAGING_DIR: &str = "./persistence/";
pub const DEFAULT_NAME_LENGTH: usize = 6;

/// Typed view of the keys the library reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub staging_dir: PathBuf,
    pub dialect: CsvDialect,
    pub null_display: String,
    pub name_length: usize,
    pub connect_attempts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            dialect: CsvDialect::default(),
            null_display: DEFAULT_NULL_DISPLAY.to_string(),
            name_length: DEFAULT_NAME_LENGTH,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }
}

impl Settings {
    /// Missing keys fall back to their defaults; present keys must be valid.
    pub fn from_configuration(config: &Configuration) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let separator = config.get_or(CSV_SEPARATOR, "|");
        let newline = config.get_or(CSV_NEWLINE, "\r\n");
        let dialect = CsvDialect::from_text(separator, newline).map_err(|e| match e {
            ConfigError::InvalidValue { key, value, message } => ConfigError::InvalidValue {
                key: if key == "separator" { CSV_SEPARATOR } else { CSV_NEWLINE }.to_string(),
                value,
                message,
            },
            other => other,
        })?;

        let name_length = config
            .get_parsed(NAME_LENGTH)?
            .unwrap_or(defaults.name_length);
        let connect_attempts: usize = config
            .get_parsed(CONNECT_ATTEMPTS)?
            .unwrap_or(defaults.connect_attempts);
        if name_length == 0 || connect_attempts == 0 {
            let key = if name_length == 0 { NAME_LENGTH } else { CONNECT_ATTEMPTS };
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: "0".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Settings {
            staging_dir: config
                .get(STAGING_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            dialect,
            null_display: config
                .get(DISPLAY_NULL)
                .map(str::to_string)
                .unwrap_or(defaults.null_display),
            name_length,
            connect_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LineTerminator;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_configuration_gives_defaults() {
        let settings = Settings::from_configuration(&Configuration::new()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.staging_dir, PathBuf::from("./persistence/"));
        assert_eq!(settings.dialect.separator, "|");
        assert_eq!(settings.dialect.terminator, LineTerminator::Crlf);
        assert_eq!(settings.null_display, "-");
        assert_eq!(settings.name_length, 6);
        assert_eq!(settings.connect_attempts, 2);
    }

    #[test]
    fn configured_values_are_applied() {
        let mut config = Configuration::new();
        config
            .set(STAGING_DIR, "/tmp/stage")
            .set(CSV_SEPARATOR, "::")
            .set(CSV_NEWLINE, "\n")
            .set(DISPLAY_NULL, "NULL")
            .set(NAME_LENGTH, "10")
            .set(CONNECT_ATTEMPTS, "3");

        let settings = Settings::from_configuration(&config).unwrap();
        assert_eq!(settings.staging_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(settings.dialect.separator, "::");
        assert_eq!(settings.dialect.terminator, LineTerminator::Byte(b'\n'));
        assert_eq!(settings.null_display, "NULL");
        assert_eq!(settings.name_length, 10);
        assert_eq!(settings.connect_attempts, 3);
    }

    #[test]
    fn invalid_values_name_their_key() {
        let mut config = Configuration::new();
        config.set(CSV_SEPARATOR, "");
        match Settings::from_configuration(&config) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, CSV_SEPARATOR),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut config = Configuration::new();
        config.set(CONNECT_ATTEMPTS, "0");
        match Settings::from_configuration(&config) {
            Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, CONNECT_ATTEMPTS),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut config = Configuration::new();
        config.set(NAME_LENGTH, "six");
        assert!(Settings::from_configuration(&config).is_err());
    }
}
