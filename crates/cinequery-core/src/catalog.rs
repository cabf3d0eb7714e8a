//! Schema catalog builder.
//!
//! Introspects every SQLite source under the data directory once per process
//! and records tables, columns, row counts and distinct-value summaries. The
//! catalog grounds plan and query generation: low-cardinality columns get
//! their full value list, high-cardinality columns a bounded sample, so the
//! prompt rendering cannot grow without bound.
//!
//! Per-source failures are recorded inline and never abort the build.
//! Catalog-level errors (missing root, zero sources) mean no structured
//! retrieval is possible this process.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CatalogError;

/// Columns with at most this many distinct values are enumerated in full.
pub const EXHAUSTIVE_LIMIT: usize = 50;
/// Sample size stored for columns above [`EXHAUSTIVE_LIMIT`].
pub const SAMPLE_SIZE: usize = 20;

const SOURCE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// One column of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub primary_key: bool,
}

/// Distinct-value summary for one column.
///
/// When `exhaustive` is true, `values` holds every distinct non-null value
/// (ascending) and its length equals `distinct_count`. Otherwise `values` is
/// an ascending sample of [`SAMPLE_SIZE`] and `distinct_count` is the true
/// count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSummary {
    pub distinct_count: u64,
    pub values: Vec<String>,
    pub exhaustive: bool,
}

/// One table of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub row_count: Option<u64>,
    pub summaries: BTreeMap<String, ValueSummary>,
    /// Flattened vocabulary of the designated comma-joined tag column, if
    /// the table has one.
    pub tag_vocabulary: Option<Vec<String>>,
}

/// One structured source: either fully introspected or failed with a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceEntry {
    Tables {
        path: PathBuf,
        tables: BTreeMap<String, TableInfo>,
    },
    Failed {
        message: String,
    },
}

/// Immutable schema/value summary of all structured sources. Built once per
/// process; rebuilding is the only way to pick up schema changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub root: PathBuf,
    pub sources: BTreeMap<String, SourceEntry>,
    /// Set when the catalog could not be built at all; such a catalog has no
    /// usable sources and the planner sees the error text instead of schema.
    pub unavailable: Option<String>,
}

impl SchemaCatalog {
    /// Introspect every SQLite file under `root`.
    ///
    /// `tag_column` names the comma-joined categorical column whose values
    /// are split into a combined tag vocabulary wherever it appears.
    pub fn build(root: &Path, tag_column: &str) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(root.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(root)
            .map_err(|source| CatalogError::RootUnreadable {
                path: root.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CatalogError::NoSources(root.to_path_buf()));
        }

        let mut sources = BTreeMap::new();
        for path in files {
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("unknown")
                .to_string();

            let entry = match introspect_source(&path, tag_column) {
                Ok(tables) => SourceEntry::Tables {
                    path: path.clone(),
                    tables,
                },
                Err(e) => {
                    warn!(source = %name, error = %e, "failed to introspect source");
                    SourceEntry::Failed {
                        message: e.to_string(),
                    }
                }
            };
            sources.insert(name, entry);
        }

        Ok(Self {
            root: root.to_path_buf(),
            sources,
            unavailable: None,
        })
    }

    /// Degraded catalog for when [`SchemaCatalog::build`] failed outright.
    /// Carries the error so the planner knows structured retrieval is off
    /// the table this process.
    pub fn unavailable(root: &Path, message: impl Into<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            sources: BTreeMap::new(),
            unavailable: Some(message.into()),
        }
    }

    /// Path of a successfully loaded source, if any.
    pub fn source_path(&self, name: &str) -> Option<&Path> {
        match self.sources.get(name) {
            Some(SourceEntry::Tables { path, .. }) => Some(path),
            _ => None,
        }
    }

    /// Text rendering handed to the planner.
    pub fn render_for_prompt(&self) -> String {
        if let Some(message) = &self.unavailable {
            return format!("DATABASE CATALOG ERROR: {message}\nNo structured sources are available; do not select the sql tool.");
        }

        let mut out = String::from("DATABASE CATALOG:\n");
        for (name, entry) in &self.sources {
            match entry {
                SourceEntry::Failed { message } => {
                    out.push_str(&format!("\nSource '{name}': UNAVAILABLE ({message})\n"));
                }
                SourceEntry::Tables { tables, .. } => {
                    out.push_str(&format!("\n=== Source: {name} ===\n"));
                    for (table_name, table) in tables {
                        render_table(&mut out, table_name, table);
                    }
                }
            }
        }
        out
    }
}

fn render_table(out: &mut String, name: &str, table: &TableInfo) {
    out.push_str(&format!("\nTABLE: {name}\n"));
    match table.row_count {
        Some(n) => out.push_str(&format!("Total rows: {n}\n")),
        None => out.push_str("Total rows: unknown\n"),
    }
    out.push_str("COLUMNS:\n");
    for column in &table.columns {
        let pk = if column.primary_key { " [PRIMARY KEY]" } else { "" };
        out.push_str(&format!("  - {} ({}){}\n", column.name, column.decl_type, pk));
        if let Some(summary) = table.summaries.get(&column.name) {
            if summary.exhaustive {
                out.push_str(&format!(
                    "      {} distinct values: {}\n",
                    summary.distinct_count,
                    quoted_list(&summary.values)
                ));
            } else {
                out.push_str(&format!(
                    "      {} distinct values (sample): {}, ...\n",
                    summary.distinct_count,
                    quoted_list(&summary.values[..summary.values.len().min(10)])
                ));
            }
        }
    }
    if let Some(tags) = &table.tag_vocabulary {
        out.push_str(&format!("INDIVIDUAL TAGS: {}\n", tags.join(", ")));
    }
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn introspect_source(
    path: &Path,
    tag_column: &str,
) -> Result<BTreeMap<String, TableInfo>, rusqlite::Error> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut tables = BTreeMap::new();
    let table_names: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for table_name in table_names {
        tables.insert(
            table_name.clone(),
            introspect_table(&conn, &table_name, tag_column),
        );
    }

    Ok(tables)
}

fn introspect_table(conn: &Connection, table: &str, tag_column: &str) -> TableInfo {
    let mut info = TableInfo::default();

    info.columns = match read_columns(conn, table) {
        Ok(columns) => columns,
        Err(e) => {
            warn!(table, error = %e, "failed to read column metadata");
            return info;
        }
    };

    // Row count and per-column summaries are best effort: a failure leaves
    // the field empty without losing the rest of the table.
    info.row_count = conn
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .ok();

    for column in &info.columns {
        match summarize_column(conn, table, &column.name) {
            Ok(summary) => {
                info.summaries.insert(column.name.clone(), summary);
            }
            Err(e) => {
                debug!(table, column = %column.name, error = %e, "skipping value summary");
            }
        }
    }

    if info.columns.iter().any(|c| c.name == tag_column) {
        match collect_tag_vocabulary(conn, table, tag_column) {
            Ok(tags) => info.tag_vocabulary = Some(tags),
            Err(e) => debug!(table, error = %e, "skipping tag vocabulary"),
        }
    }

    info
}

fn read_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>, rusqlite::Error> {
    conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?
        .query_map([], |row| {
            Ok(ColumnInfo {
                name: row.get(1)?,
                decl_type: row.get(2)?,
                primary_key: row.get::<_, i64>(5)? != 0,
            })
        })?
        .collect()
}

fn summarize_column(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<ValueSummary, rusqlite::Error> {
    let distinct_count: u64 = conn.query_row(
        &format!(
            "SELECT COUNT(DISTINCT \"{column}\") FROM \"{table}\" WHERE \"{column}\" IS NOT NULL"
        ),
        [],
        |row| row.get(0),
    )?;

    let limit = if distinct_count as usize <= EXHAUSTIVE_LIMIT {
        EXHAUSTIVE_LIMIT
    } else {
        SAMPLE_SIZE
    };

    let values: Vec<String> = conn
        .prepare(&format!(
            "SELECT DISTINCT \"{column}\" FROM \"{table}\" WHERE \"{column}\" IS NOT NULL ORDER BY \"{column}\" LIMIT {limit}"
        ))?
        .query_map([], |row| Ok(value_to_string(row.get_ref(0)?)))?
        .collect::<Result<_, _>>()?;

    Ok(ValueSummary {
        distinct_count,
        exhaustive: distinct_count as usize <= EXHAUSTIVE_LIMIT,
        values,
    })
}

fn collect_tag_vocabulary(
    conn: &Connection,
    table: &str,
    column: &str,
) -> Result<Vec<String>, rusqlite::Error> {
    let raw: Vec<String> = conn
        .prepare(&format!(
            "SELECT DISTINCT \"{column}\" FROM \"{table}\" WHERE \"{column}\" IS NOT NULL"
        ))?
        .query_map([], |row| Ok(value_to_string(row.get_ref(0)?)))?
        .collect::<Result<_, _>>()?;

    let mut tags = BTreeSet::new();
    for joined in raw {
        for tag in joined.split(',') {
            let tag = tag.trim();
            if !tag.is_empty() {
                tags.insert(tag.to_string());
            }
        }
    }
    Ok(tags.into_iter().collect())
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
