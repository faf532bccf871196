//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Database-level settings
    #[serde(default)]
    pub database: RawDatabaseConfig,

    /// Declared stores (tables)
    #[serde(default)]
    pub stores: Vec<RawStore>,
}

/// Database-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDatabaseConfig {
    /// Database name, also used for the file name
    pub name: Option<String>,

    /// Schema version; bumping it runs the upgrade step
    pub version: Option<u32>,

    /// Data directory for the database file
    pub data_dir: Option<PathBuf>,

    /// Storage budget in bytes. Writes beyond it fail with a quota error.
    pub quota_bytes: Option<u64>,
}

/// Raw store definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawStore {
    /// Table name
    pub name: String,

    /// Field of the record that holds its key
    pub key_path: Option<String>,

    /// Whether the store assigns keys itself
    pub auto_increment: Option<bool>,

    #[serde(default)]
    pub indexes: Vec<RawIndex>,
}

/// Raw index definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawIndex {
    /// Index name, unique within its store
    pub name: String,

    /// Top-level record field the index is built on
    pub key_path: String,

    #[serde(default)]
    pub unique: bool,
}
