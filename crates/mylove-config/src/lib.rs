//! Configuration parsing and validation for the mylove local store
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Database name, schema version and storage quota
//! - Store (table) definitions with key paths and indexes
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<DatabaseSettings> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading config");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<DatabaseSettings> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(DatabaseSettings::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[stores]]
            name = "messages"
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.name, DEFAULT_DATABASE_NAME);
        assert_eq!(settings.version, 1);
        assert_eq!(settings.stores.len(), 1);
        assert_eq!(settings.stores[0].name, "messages");
        assert_eq!(settings.stores[0].key_path, "id");
        assert!(settings.stores[0].auto_increment);
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [database]
            name = "my-love-db"
            version = 4
            data_dir = "/tmp/mylove-test"
            quota_bytes = 1048576

            [[stores]]
            name = "moods"

            [[stores.indexes]]
            name = "by-date"
            key_path = "date"
            unique = true

            [[stores]]
            name = "photos"

            [[stores.indexes]]
            name = "by-date"
            key_path = "uploadDate"
        "#;

        let settings = parse_config(config).unwrap();
        assert_eq!(settings.name, "my-love-db");
        assert_eq!(settings.version, 4);
        assert_eq!(settings.quota_bytes, Some(1_048_576));
        assert_eq!(
            settings.database_path(),
            std::path::PathBuf::from("/tmp/mylove-test/my-love-db.sqlite3")
        );

        let moods = settings.get_store("moods").unwrap();
        assert!(moods.indexes[0].unique);
        let photos = settings.get_store("photos").unwrap();
        assert!(!photos.indexes[0].unique);
        assert_eq!(photos.indexes[0].key_path, "uploadDate");
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99

            [[stores]]
            name = "moods"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_store_names() {
        let config = r#"
            config_version = 1

            [[stores]]
            name = "moods; DROP TABLE moods"
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            config_version = 1

            [database]
            version = 2

            [[stores]]
            name = "messages"
            "#
        )
        .unwrap();

        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.version, 2);
    }

    #[test]
    fn load_config_missing_file() {
        let result = load_config("/definitely/not/here/config.toml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
