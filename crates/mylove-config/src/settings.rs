//! Validated settings structures

use crate::schema::{RawConfig, RawIndex, RawStore};
use mylove_util::{data_dir_without_env, database_file_name};
use std::path::PathBuf;

/// Database name used when the config does not name one
pub const DEFAULT_DATABASE_NAME: &str = "my-love-db";

/// Key path used when a store does not declare one
pub const DEFAULT_KEY_PATH: &str = "id";

/// Validated database settings ready for use by the store
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub name: String,
    pub version: u32,
    pub data_dir: PathBuf,
    pub quota_bytes: Option<u64>,
    pub stores: Vec<StoreDefinition>,
}

impl DatabaseSettings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            name: raw
                .database
                .name
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            version: raw.database.version.unwrap_or(1),
            data_dir: raw.database.data_dir.unwrap_or_else(data_dir_without_env),
            quota_bytes: raw.database.quota_bytes,
            stores: raw.stores.into_iter().map(StoreDefinition::from_raw).collect(),
        }
    }

    /// Path of the database file inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(database_file_name(&self.name))
    }

    /// Get store definition by name
    pub fn get_store(&self, name: &str) -> Option<&StoreDefinition> {
        self.stores.iter().find(|s| s.name == name)
    }
}

/// Validated store definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDefinition {
    pub name: String,
    pub key_path: String,
    pub auto_increment: bool,
    pub indexes: Vec<IndexDefinition>,
}

impl StoreDefinition {
    fn from_raw(raw: RawStore) -> Self {
        Self {
            name: raw.name,
            key_path: raw
                .key_path
                .unwrap_or_else(|| DEFAULT_KEY_PATH.to_string()),
            auto_increment: raw.auto_increment.unwrap_or(true),
            indexes: raw.indexes.into_iter().map(IndexDefinition::from_raw).collect(),
        }
    }
}

/// Validated index definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

impl IndexDefinition {
    fn from_raw(raw: RawIndex) -> Self {
        Self {
            name: raw.name,
            key_path: raw.key_path,
            unique: raw.unique,
        }
    }
}
