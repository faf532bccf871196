//! Store and index schemas, and the SQL they map to

use mylove_config::{DEFAULT_KEY_PATH, IndexDefinition, StoreDefinition, check_key_path, check_name};
use rusqlite::Connection;
use tracing::debug;

use crate::{StoreError, StoreResult};

/// Definition of one store (table) of records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub name: String,
    /// Record field holding the key
    pub key_path: String,
    /// Whether the store assigns keys to records added without one
    pub auto_increment: bool,
    pub indexes: Vec<IndexSchema>,
}

impl StoreSchema {
    /// An auto-incrementing store keyed by `id`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: DEFAULT_KEY_PATH.to_string(),
            auto_increment: true,
            indexes: Vec::new(),
        }
    }

    pub fn key_path(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = key_path.into();
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    pub fn index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        check_name(&self.name)
            .map_err(|e| StoreError::InvalidSchema(format!("store '{}': {}", self.name, e)))?;
        check_key_path(&self.key_path).map_err(|e| {
            StoreError::InvalidSchema(format!("store '{}' key path: {}", self.name, e))
        })?;

        for (i, index) in self.indexes.iter().enumerate() {
            check_name(&index.name).map_err(|e| {
                StoreError::InvalidSchema(format!("index '{}': {}", index.name, e))
            })?;
            check_key_path(&index.key_path).map_err(|e| {
                StoreError::InvalidSchema(format!("index '{}' key path: {}", index.name, e))
            })?;
            if index.key_path == self.key_path {
                return Err(StoreError::InvalidSchema(format!(
                    "index '{}' cannot be built on the key '{}'",
                    index.name, self.key_path
                )));
            }
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(StoreError::InvalidSchema(format!(
                    "store '{}' declares index '{}' twice",
                    self.name, index.name
                )));
            }
        }
        Ok(())
    }

    /// Quoted table name for use in SQL
    pub(crate) fn table(&self) -> String {
        quote_ident(&self.name)
    }

    /// Create the table and its indexes if they do not exist yet
    pub(crate) fn create(&self, conn: &Connection) -> StoreResult<()> {
        let key_column = if self.auto_increment {
            "id INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "id INTEGER PRIMARY KEY"
        };

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, value TEXT NOT NULL);",
            self.table(),
            key_column
        ))?;

        for index in &self.indexes {
            let unique = if index.unique { "UNIQUE " } else { "" };
            conn.execute_batch(&format!(
                "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
                unique,
                quote_ident(&format!("{}__{}", self.name, index.name)),
                self.table(),
                index.expression()
            ))?;
        }

        debug!(store = %self.name, indexes = self.indexes.len(), "Store created");
        Ok(())
    }
}

impl From<&StoreDefinition> for StoreSchema {
    fn from(def: &StoreDefinition) -> Self {
        Self {
            name: def.name.clone(),
            key_path: def.key_path.clone(),
            auto_increment: def.auto_increment,
            indexes: def.indexes.iter().map(IndexSchema::from).collect(),
        }
    }
}

/// Secondary index over one top-level record field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub key_path: String,
    pub unique: bool,
}

impl IndexSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    pub fn unique(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name, key_path)
        }
    }

    /// The indexed expression. Queries must use the exact same text for
    /// SQLite to pick the index.
    pub(crate) fn expression(&self) -> String {
        format!("json_extract(value, '$.{}')", self.key_path)
    }
}

impl From<&IndexDefinition> for IndexSchema {
    fn from(def: &IndexDefinition) -> Self {
        Self {
            name: def.name.clone(),
            key_path: def.key_path.clone(),
            unique: def.unique,
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let schema = StoreSchema::new("moods").index(IndexSchema::unique("by-date", "date"));
        assert_eq!(schema.key_path, "id");
        assert!(schema.auto_increment);
        assert!(schema.get_index("by-date").unwrap().unique);
        assert!(schema.get_index("by-category").is_none());
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_schemas() {
        assert!(StoreSchema::new("bad name").validate().is_err());
        assert!(StoreSchema::new("moods").key_path("a.b").validate().is_err());
        assert!(
            StoreSchema::new("moods")
                .index(IndexSchema::new("by-id", "id"))
                .validate()
                .is_err()
        );
        assert!(
            StoreSchema::new("moods")
                .index(IndexSchema::new("by-date", "date"))
                .index(IndexSchema::new("by-date", "timestamp"))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn create_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let schema = StoreSchema::new("sw-auth").index(IndexSchema::unique("by-user", "userId"));

        schema.create(&conn).unwrap();
        schema.create(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE tbl_name = 'sw-auth'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        // table + index
        assert_eq!(count, 2);
    }

    #[test]
    fn from_definition() {
        let def = StoreDefinition {
            name: "photos".into(),
            key_path: "id".into(),
            auto_increment: true,
            indexes: vec![IndexDefinition {
                name: "by-date".into(),
                key_path: "uploadDate".into(),
                unique: false,
            }],
        };

        let schema = StoreSchema::from(&def);
        assert_eq!(schema.name, "photos");
        assert_eq!(schema.indexes[0].expression(), "json_extract(value, '$.uploadDate')");
    }
}
