//! Conversion between typed records and stored JSON documents
//!
//! A stored document is the record's JSON object without its key field. The
//! key lives in the table's `id` column and is written back into the object
//! at the store's key path when the record is read.

use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{RecordId, StoreError, StoreResult};

pub(crate) type Document = Map<String, Value>;

/// Serialize a record or partial record into a JSON object
pub(crate) fn to_document<S: Serialize + ?Sized>(value: &S) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidRecord(format!(
            "records must serialize to JSON objects, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Remove the key field from a document, returning its value if it was set.
///
/// A missing or `null` key means "let the store assign one".
pub(crate) fn take_key(doc: &mut Document, key_path: &str) -> StoreResult<Option<RecordId>> {
    match doc.remove(key_path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(|id| Some(RecordId::new(id))).ok_or_else(|| {
            StoreError::InvalidRecord(format!("key '{}' must be an integer, got {}", key_path, n))
        }),
        Some(other) => Err(StoreError::InvalidRecord(format!(
            "key '{}' must be an integer, got {}",
            key_path,
            json_type_name(&other)
        ))),
    }
}

/// Rebuild a typed record from a stored document and its key
pub(crate) fn from_document<T: DeserializeOwned>(
    mut doc: Document,
    key_path: &str,
    id: RecordId,
) -> StoreResult<T> {
    doc.insert(key_path.to_string(), Value::from(id.get()));
    serde_json::from_value(Value::Object(doc)).map_err(|e| {
        StoreError::InvalidRecord(format!("record {} does not match its type: {}", id, e))
    })
}

/// Parse the `value` column of a row
pub(crate) fn parse_document(text: &str) -> StoreResult<Document> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "stored value is a JSON {}, expected an object",
            json_type_name(&other)
        ))),
    }
}

/// Shallow merge: every top-level field of `patch` replaces the field of the
/// same name in `doc`.
pub(crate) fn merge(doc: &mut Document, patch: Document) {
    for (field, value) in patch {
        doc.insert(field, value);
    }
}

/// Convert a JSON scalar into a SQL parameter comparable with
/// `json_extract` output.
pub(crate) fn to_sql_value(value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(StoreError::InvalidRecord(format!(
                    "index value {} is out of range",
                    n
                )))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(StoreError::InvalidRecord(format!(
            "index values must be scalars, got {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
