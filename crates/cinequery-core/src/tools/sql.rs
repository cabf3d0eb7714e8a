//! Structured query tool.
//!
//! Validates the requested source against the catalog, opens the SQLite
//! file read-only and runs the query on the blocking pool. Rows come back
//! as JSON objects keyed by column name.

use std::path::Path;
use std::sync::Arc;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{json, Value};
use tracing::debug;

use crate::catalog::{SchemaCatalog, SourceEntry};

pub struct SqlTool {
    catalog: Arc<SchemaCatalog>,
}

impl SqlTool {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn run(&self, query: &str, source: &str) -> Result<Value, String> {
        let path = match self.catalog.sources.get(source) {
            Some(SourceEntry::Tables { path, .. }) => path.clone(),
            Some(SourceEntry::Failed { message }) => {
                return Err(format!("source '{source}' is unavailable: {message}"));
            }
            None => return Err(format!("source '{source}' not found in catalog")),
        };

        debug!(source, query, "running structured query");

        let query = query.to_string();
        let rows = tokio::task::spawn_blocking(move || run_query(&path, &query))
            .await
            .map_err(|e| format!("query task failed: {e}"))??;

        let row_count = rows.len();
        Ok(json!({ "rows": rows, "row_count": row_count }))
    }
}

fn run_query(path: &Path, query: &str) -> Result<Vec<Value>, String> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format!("failed to open source: {e}"))?;

    let mut stmt = conn
        .prepare(query)
        .map_err(|e| format!("SQL error: {e}"))?;
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query([]).map_err(|e| format!("SQL error: {e}"))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| format!("SQL error: {e}"))? {
        let mut object = serde_json::Map::with_capacity(column_names.len());
        for (index, name) in column_names.iter().enumerate() {
            let value = row
                .get_ref(index)
                .map_err(|e| format!("SQL error: {e}"))?;
            object.insert(name.clone(), value_to_json(value));
        }
        out.push(Value::Object(object));
    }
    Ok(out)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::from(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::from(format!("<blob {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_to_json_maps_sqlite_types() {
        assert_eq!(value_to_json(ValueRef::Null), Value::Null);
        assert_eq!(value_to_json(ValueRef::Integer(7)), json!(7));
        assert_eq!(value_to_json(ValueRef::Text(b"hi")), json!("hi"));
        assert_eq!(value_to_json(ValueRef::Blob(&[1, 2, 3])), json!("<blob 3 bytes>"));
    }
}
