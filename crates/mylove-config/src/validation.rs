//! Configuration validation

use crate::schema::{RawConfig, RawStore};
use std::collections::HashSet;
use thiserror::Error;

/// Longest accepted store, index or database name
const MAX_NAME_LEN: usize = 64;

/// Validation error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Store '{store}': {message}")]
    StoreError { store: String, message: String },

    #[error("Duplicate store name: {0}")]
    DuplicateStoreName(String),

    #[error("Store '{store}': duplicate index name '{index}'")]
    DuplicateIndexName { store: String, index: String },

    #[error("Invalid name '{value}': {message}")]
    InvalidName { value: String, message: String },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(name) = &config.database.name
        && let Err(message) = check_name(name)
    {
        errors.push(ValidationError::InvalidName {
            value: name.clone(),
            message,
        });
    }

    if config.database.version == Some(0) {
        errors.push(ValidationError::GlobalError(
            "database version must be at least 1".into(),
        ));
    }

    if config.database.quota_bytes == Some(0) {
        errors.push(ValidationError::GlobalError(
            "quota_bytes must be greater than zero".into(),
        ));
    }

    if config.stores.is_empty() {
        errors.push(ValidationError::GlobalError(
            "at least one store must be declared".into(),
        ));
    }

    let mut seen_names = HashSet::new();
    for store in &config.stores {
        if !seen_names.insert(&store.name) {
            errors.push(ValidationError::DuplicateStoreName(store.name.clone()));
        }
    }

    for store in &config.stores {
        errors.extend(validate_store(store));
    }

    errors
}

fn validate_store(store: &RawStore) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(message) = check_name(&store.name) {
        errors.push(ValidationError::InvalidName {
            value: store.name.clone(),
            message,
        });
    }

    if let Some(key_path) = &store.key_path
        && let Err(message) = check_key_path(key_path)
    {
        errors.push(ValidationError::StoreError {
            store: store.name.clone(),
            message: format!("key_path '{}': {}", key_path, message),
        });
    }

    let mut seen_indexes = HashSet::new();
    for index in &store.indexes {
        if !seen_indexes.insert(&index.name) {
            errors.push(ValidationError::DuplicateIndexName {
                store: store.name.clone(),
                index: index.name.clone(),
            });
        }

        if let Err(message) = check_name(&index.name) {
            errors.push(ValidationError::InvalidName {
                value: index.name.clone(),
                message,
            });
        }

        if let Err(message) = check_key_path(&index.key_path) {
            errors.push(ValidationError::StoreError {
                store: store.name.clone(),
                message: format!(
                    "index '{}' key_path '{}': {}",
                    index.name, index.key_path, message
                ),
            });
        }
    }

    errors
}

/// Check a store, index or database name.
///
/// Names become SQL identifiers and file names, so they are limited to ASCII
/// letters, digits, `_` and `-`.
pub fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name is longer than {} characters", MAX_NAME_LEN));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err("names starting with 'sqlite_' are reserved".into());
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("invalid character '{}'", c));
    }
    Ok(())
}

/// Check a key path: a single top-level field name
pub fn check_key_path(key_path: &str) -> Result<(), String> {
    let mut chars = key_path.chars();
    match chars.next() {
        None => return Err("key path cannot be empty".into()),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err("key path must start with a letter or '_'".into());
        }
        _ => {}
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(format!("invalid character '{}'", c));
    }
    Ok(())
}
