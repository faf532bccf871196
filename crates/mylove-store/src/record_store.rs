//! Typed CRUD, pagination and index lookups over one store

use rusqlite::types::Value as SqlValue;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::codec;
use crate::{Database, IndexSchema, RecordId, StoreError, StoreResult, StoreSchema};

/// Handle to one store of `T` records, obtained from [`Database::store`].
///
/// Records are kept as JSON objects; `T` must serialize to one. The key is
/// stored separately and written back into the record at the store's key
/// path on every read.
pub struct RecordStore<T> {
    pub(crate) db: Database,
    pub(crate) schema: Arc<StoreSchema>,
    pub(crate) _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            schema: self.schema.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("db", &self.db.name())
            .field("store", &self.schema.name)
            .finish()
    }
}

impl<T> RecordStore<T> {
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    /// Insert a record and return it with its key set.
    ///
    /// A record that already carries an integer key is stored under that
    /// key; adding the same key twice is a constraint error.
    pub async fn add(&self, record: T) -> StoreResult<T> {
        let result = self.timed("add", self.insert(record)).await;
        if let Err(e) = &result {
            self.write_failed("add", e);
        }
        let record = result?;

        if self.db.quota_bytes().is_some() {
            self.warn_if_near_quota().await;
        }
        Ok(record)
    }

    async fn insert(&self, record: T) -> StoreResult<T> {
        let mut doc = codec::to_document(&record)?;
        let key = codec::take_key(&mut doc, &self.schema.key_path)?;
        if key.is_none() && !self.schema.auto_increment {
            return Err(StoreError::MissingKey {
                store: self.schema.name.clone(),
                key_path: self.schema.key_path.clone(),
            });
        }

        let text = serde_json::to_string(&doc)?;
        let sql = format!(
            "INSERT INTO {} (id, value) VALUES (?1, ?2)",
            self.schema.table()
        );
        let id = self
            .db
            .run(move |conn| {
                conn.execute(&sql, params![key.map(|k| k.get()), text])?;
                Ok(RecordId::new(conn.last_insert_rowid()))
            })
            .await?;

        debug!(store = %self.schema.name, id = %id, "Record added");
        codec::from_document(doc, &self.schema.key_path, id)
    }

    /// Fetch one record. `None` if no record has this key.
    pub async fn get(&self, id: RecordId) -> StoreResult<Option<T>> {
        self.timed("get", async {
            let sql = format!("SELECT value FROM {} WHERE id = ?1", self.schema.table());
            let text: Option<String> = self
                .db
                .run(move |conn| {
                    Ok(conn
                        .query_row(&sql, [id.get()], |row| row.get(0))
                        .optional()?)
                })
                .await?;

            match text {
                Some(text) => {
                    debug!(store = %self.schema.name, id = %id, "Record retrieved");
                    self.decode(id, &text).map(Some)
                }
                None => {
                    warn!(store = %self.schema.name, id = %id, "Record not found");
                    Ok(None)
                }
            }
        })
        .await
    }

    /// Every record, in key order
    pub async fn get_all(&self) -> StoreResult<Vec<T>> {
        self.timed("get_all", async {
            let sql = format!("SELECT id, value FROM {} ORDER BY id", self.schema.table());
            let records = self.query(sql, Vec::new()).await?;
            debug!(store = %self.schema.name, count = records.len(), "Records retrieved");
            Ok(records)
        })
        .await
    }

    /// Merge the top-level fields of `patch` over the stored record and
    /// return the result. The key cannot be changed this way.
    ///
    /// Fails with [`StoreError::NotFound`] if no record has this key.
    pub async fn update<P>(&self, id: RecordId, patch: &P) -> StoreResult<T>
    where
        P: Serialize + ?Sized,
    {
        let result = self.timed("update", self.merge_into(id, patch)).await;
        match &result {
            Ok(_) => debug!(store = %self.schema.name, id = %id, "Record updated"),
            Err(e) => self.write_failed("update", e),
        }
        result
    }

    async fn merge_into<P>(&self, id: RecordId, patch: &P) -> StoreResult<T>
    where
        P: Serialize + ?Sized,
    {
        let mut patch = codec::to_document(patch)?;
        patch.remove(&self.schema.key_path);

        let store = self.schema.name.clone();
        let key_path = self.schema.key_path.clone();
        let select = format!("SELECT value FROM {} WHERE id = ?1", self.schema.table());
        let update = format!("UPDATE {} SET value = ?1 WHERE id = ?2", self.schema.table());

        self.db
            .run(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<String> = tx
                    .query_row(&select, [id.get()], |row| row.get(0))
                    .optional()?;
                let Some(existing) = existing else {
                    return Err(StoreError::NotFound { store, id });
                };

                let mut doc = codec::parse_document(&existing)?;
                codec::merge(&mut doc, patch);
                let merged = serde_json::to_string(&doc)?;
                let record: T = codec::from_document(doc, &key_path, id)?;

                tx.execute(&update, params![merged, id.get()])?;
                tx.commit()?;
                Ok(record)
            })
            .await
    }

    /// Remove one record. Removing a missing key is not an error.
    pub async fn delete(&self, id: RecordId) -> StoreResult<()> {
        let result = self
            .timed("delete", async {
                let sql = format!("DELETE FROM {} WHERE id = ?1", self.schema.table());
                self.db
                    .run(move |conn| Ok(conn.execute(&sql, [id.get()])?))
                    .await
            })
            .await;

        match result {
            Ok(removed) => {
                debug!(store = %self.schema.name, id = %id, removed, "Record deleted");
                Ok(())
            }
            Err(e) => {
                self.write_failed("delete", &e);
                Err(e)
            }
        }
    }

    /// Remove every record. Keys are not reused afterwards.
    pub async fn clear(&self) -> StoreResult<()> {
        let result = self
            .timed("clear", async {
                let sql = format!("DELETE FROM {}", self.schema.table());
                self.db.run(move |conn| Ok(conn.execute(&sql, [])?)).await
            })
            .await;

        match result {
            Ok(removed) => {
                debug!(store = %self.schema.name, removed, "Store cleared");
                Ok(())
            }
            Err(e) => {
                self.write_failed("clear", &e);
                Err(e)
            }
        }
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.timed("count", async {
            let sql = format!("SELECT COUNT(*) FROM {}", self.schema.table());
            let count: i64 = self
                .db
                .run(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
                .await?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }

    /// Up to `limit` records in key order, skipping the first `offset`.
    ///
    /// Each call scans from the first record again, so deep pages cost
    /// O(offset + limit). Callers that remember the last key they saw can
    /// use [`get_page_after`](Self::get_page_after) instead.
    pub async fn get_page(&self, offset: usize, limit: usize) -> StoreResult<Vec<T>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.timed("get_page", async {
            let sql = format!(
                "SELECT id, value FROM {} ORDER BY id LIMIT ?1 OFFSET ?2",
                self.schema.table()
            );
            let records = self
                .query(sql, vec![sql_count(limit), sql_count(offset)])
                .await?;
            debug!(
                store = %self.schema.name,
                offset,
                limit,
                count = records.len(),
                "Page retrieved"
            );
            Ok(records)
        })
        .await
    }

    /// Up to `limit` records whose key is greater than `after`, in key order.
    /// `None` starts from the first record.
    pub async fn get_page_after(
        &self,
        after: Option<RecordId>,
        limit: usize,
    ) -> StoreResult<Vec<T>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.timed("get_page_after", async {
            let sql = format!(
                "SELECT id, value FROM {} WHERE id > ?1 ORDER BY id LIMIT ?2",
                self.schema.table()
            );
            let after = after.map_or(i64::MIN, |id| id.get());
            self.query(sql, vec![SqlValue::Integer(after), sql_count(limit)])
                .await
        })
        .await
    }

    /// First record (lowest key) whose indexed field equals `value`
    pub async fn get_from_index<V>(&self, index: &str, value: &V) -> StoreResult<Option<T>>
    where
        V: Serialize + ?Sized,
    {
        self.timed("get_from_index", async {
            let index = self.index(index)?;
            let value = index_value(value)?;
            let sql = format!(
                "SELECT id, value FROM {} WHERE {} = ?1 ORDER BY id LIMIT 1",
                self.schema.table(),
                index.expression()
            );
            Ok(self.query(sql, vec![value]).await?.into_iter().next())
        })
        .await
    }

    /// Every record whose indexed field equals `value`, in key order
    pub async fn get_all_from_index<V>(&self, index: &str, value: &V) -> StoreResult<Vec<T>>
    where
        V: Serialize + ?Sized,
    {
        self.timed("get_all_from_index", async {
            let index = self.index(index)?;
            let value = index_value(value)?;
            let sql = format!(
                "SELECT id, value FROM {} WHERE {} = ?1 ORDER BY id",
                self.schema.table(),
                index.expression()
            );
            self.query(sql, vec![value]).await
        })
        .await
    }

    /// Records whose indexed field lies in `lower..=upper`, ordered by that
    /// field and then by key
    pub async fn get_range_from_index<V>(
        &self,
        index: &str,
        lower: &V,
        upper: &V,
    ) -> StoreResult<Vec<T>>
    where
        V: Serialize + ?Sized,
    {
        self.timed("get_range_from_index", async {
            let index = self.index(index)?;
            let lower = index_value(lower)?;
            let upper = index_value(upper)?;
            let expression = index.expression();
            let sql = format!(
                "SELECT id, value FROM {} WHERE {} >= ?1 AND {} <= ?2 ORDER BY {}, id",
                self.schema.table(),
                expression,
                expression,
                expression
            );
            self.query(sql, vec![lower, upper]).await
        })
        .await
    }

    /// Like [`get`](Self::get), but a failed read is logged and reported as
    /// a missing record.
    pub async fn get_or_none(&self, id: RecordId) -> Option<T> {
        self.get(id).await.unwrap_or_else(|e| {
            error!(store = %self.schema.name, id = %id, error = %e, "Failed to get record");
            None
        })
    }

    /// Like [`get_all`](Self::get_all), but a failed read yields an empty list
    pub async fn get_all_or_empty(&self) -> Vec<T> {
        self.get_all().await.unwrap_or_else(|e| {
            error!(store = %self.schema.name, error = %e, "Failed to get all records");
            Vec::new()
        })
    }

    /// Like [`get_page`](Self::get_page), but a failed read yields an empty page
    pub async fn get_page_or_empty(&self, offset: usize, limit: usize) -> Vec<T> {
        self.get_page(offset, limit).await.unwrap_or_else(|e| {
            error!(
                store = %self.schema.name,
                offset,
                limit,
                error = %e,
                "Failed to get page"
            );
            Vec::new()
        })
    }

    async fn query(&self, sql: String, params: Vec<SqlValue>) -> StoreResult<Vec<T>> {
        let rows: Vec<(i64, String)> = self
            .db
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(params), |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, text)| self.decode(RecordId::new(id), &text))
            .collect()
    }

    fn decode(&self, id: RecordId, text: &str) -> StoreResult<T> {
        codec::from_document(codec::parse_document(text)?, &self.schema.key_path, id)
    }

    async fn warn_if_near_quota(&self) {
        match self.db.estimate().await {
            Ok(estimate) if estimate.is_critical() => warn!(
                store = %self.schema.name,
                percent_used = estimate.percent_used(),
                "Storage almost full"
            ),
            Ok(estimate) if estimate.is_near_quota() => warn!(
                store = %self.schema.name,
                percent_used = estimate.percent_used(),
                "Storage usage above warning threshold"
            ),
            Ok(_) => {}
            Err(e) => debug!(store = %self.schema.name, error = %e, "Storage estimate failed"),
        }
    }
}

impl<T> RecordStore<T> {
    fn index(&self, name: &str) -> StoreResult<&IndexSchema> {
        self.schema
            .get_index(name)
            .ok_or_else(|| StoreError::UnknownIndex {
                store: self.schema.name.clone(),
                index: name.to_string(),
            })
    }

    async fn timed<R, F>(&self, operation: &str, op: F) -> StoreResult<R>
    where
        F: Future<Output = StoreResult<R>>,
    {
        let metric = format!("{}.{}", self.schema.name, operation);
        self.db.metrics().measure(&metric, op).await
    }

    fn write_failed(&self, operation: &str, err: &StoreError) {
        if err.is_quota_exceeded() {
            error!(
                store = %self.schema.name,
                operation,
                "Storage quota exceeded, free up space before adding more records"
            );
        } else {
            error!(store = %self.schema.name, operation, error = %err, "Write failed");
        }
    }
}

fn index_value<V: Serialize + ?Sized>(value: &V) -> StoreResult<SqlValue> {
    codec::to_sql_value(&serde_json::to_value(value)?)
}

fn sql_count(n: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}
