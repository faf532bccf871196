//! Subcommands and their JSON output

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use mylove_store::{Database, RecordId, RecordStore};
use serde_json::{Value, json};

type JsonStore = RecordStore<Value>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the declared stores and their indexes
    Stores,

    /// Add a record given as a JSON object
    Add { store: String, record: String },

    /// Print one record
    Get { store: String, id: RecordId },

    /// Print every record, or the records whose index matches a value
    List {
        store: String,

        /// Index to look up
        #[arg(long, requires = "value")]
        index: Option<String>,

        /// Indexed value (JSON, or a bare string)
        #[arg(long, requires = "index")]
        value: Option<String>,
    },

    /// Print one page of records in key order
    Page {
        store: String,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Start after this key instead of skipping `offset` records
        #[arg(long)]
        after: Option<RecordId>,
    },

    /// Merge the fields of a JSON object into a record
    Update {
        store: String,
        id: RecordId,
        patch: String,
    },

    /// Delete one record
    Delete { store: String, id: RecordId },

    /// Delete every record in a store
    Clear { store: String },

    /// Count the records in a store
    Count { store: String },

    /// Show storage usage against the configured quota
    Estimate,
}

pub async fn run(db: &Database, command: Command) -> Result<Value> {
    match command {
        Command::Stores => Ok(stores(db)),

        Command::Add { store, record } => {
            let record = parse_object(&record)?;
            let added = open(db, &store)?
                .add(record)
                .await
                .with_context(|| format!("Failed to add record to {}", store))?;
            Ok(added)
        }

        Command::Get { store, id } => match open(db, &store)?.get(id).await? {
            Some(record) => Ok(record),
            None => bail!("No record {} in {}", id, store),
        },

        Command::List {
            store,
            index,
            value,
        } => {
            let records = match (index, value) {
                (Some(index), Some(value)) => {
                    open(db, &store)?
                        .get_all_from_index(&index, &parse_value(&value))
                        .await?
                }
                _ => open(db, &store)?.get_all().await?,
            };
            Ok(Value::Array(records))
        }

        Command::Page {
            store,
            offset,
            limit,
            after,
        } => {
            let store = open(db, &store)?;
            let records = match after {
                Some(after) => store.get_page_after(Some(after), limit).await?,
                None => store.get_page(offset, limit).await?,
            };
            Ok(Value::Array(records))
        }

        Command::Update { store, id, patch } => {
            let patch = parse_object(&patch)?;
            let updated = open(db, &store)?
                .update(id, &patch)
                .await
                .with_context(|| format!("Failed to update record {} in {}", id, store))?;
            Ok(updated)
        }

        Command::Delete { store, id } => {
            open(db, &store)?.delete(id).await?;
            Ok(json!({ "deleted": id }))
        }

        Command::Clear { store } => {
            open(db, &store)?.clear().await?;
            Ok(json!({ "cleared": store }))
        }

        Command::Count { store } => {
            let count = open(db, &store)?.count().await?;
            Ok(json!({ "store": store, "count": count }))
        }

        Command::Estimate => {
            let estimate = db.estimate().await?;
            Ok(json!({
                "usage_bytes": estimate.usage_bytes,
                "quota_bytes": estimate.quota_bytes,
                "remaining_bytes": estimate.remaining_bytes(),
                "percent_used": estimate.percent_used(),
                "near_quota": estimate.is_near_quota(),
            }))
        }
    }
}

fn open(db: &Database, store: &str) -> Result<JsonStore> {
    Ok(db.store::<Value>(store)?)
}

fn stores(db: &Database) -> Value {
    let stores: Vec<Value> = db
        .schemas()
        .map(|schema| {
            json!({
                "name": schema.name,
                "key_path": schema.key_path,
                "auto_increment": schema.auto_increment,
                "indexes": schema
                    .indexes
                    .iter()
                    .map(|index| json!({
                        "name": index.name,
                        "key_path": index.key_path,
                        "unique": index.unique,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "database": db.name(),
        "version": db.version(),
        "stores": stores,
    })
}

fn parse_object(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text).context("Expected a JSON object")?;
    if !value.is_object() {
        bail!("Expected a JSON object, got {}", value);
    }
    Ok(value)
}

/// Index values may be given as JSON (`7`, `true`) or as a bare string
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mylove_store::{IndexSchema, Location, StoreSchema};

    fn db() -> Database {
        Database::builder(Location::InMemory)
            .store(StoreSchema::new("messages").index(IndexSchema::new("by-category", "category")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("7"), json!(7));
        assert_eq!(parse_value("\"7\""), json!("7"));
        assert_eq!(parse_value("love"), json!("love"));
    }

    #[test]
    fn test_parse_object() {
        assert!(parse_object(r#"{"text": "hi"}"#).is_ok());
        assert!(parse_object("[1, 2]").is_err());
        assert!(parse_object("not json").is_err());
    }

    #[tokio::test]
    async fn test_add_list_and_page() {
        let db = db();
        for (text, category) in [("a", "love"), ("b", "custom"), ("c", "love")] {
            run(
                &db,
                Command::Add {
                    store: "messages".into(),
                    record: json!({ "text": text, "category": category }).to_string(),
                },
            )
            .await
            .unwrap();
        }

        let love = run(
            &db,
            Command::List {
                store: "messages".into(),
                index: Some("by-category".into()),
                value: Some("love".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(love.as_array().unwrap().len(), 2);

        let page = run(
            &db,
            Command::Page {
                store: "messages".into(),
                offset: 1,
                limit: 1,
                after: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(page, json!([{ "id": 2, "text": "b", "category": "custom" }]));
    }

    #[tokio::test]
    async fn test_get_missing_record_fails() {
        let db = db();
        let result = run(
            &db,
            Command::Get {
                store: "messages".into(),
                id: RecordId::new(1),
            },
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_store() {
        let db = db();
        let result = run(&db, Command::Count { store: "photos".into() }).await;
        assert!(result.is_err());
    }
}
