use std::fmt;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::error::{MigrateError, MigrateResult};
use crate::migrate::MigrationEvent;

/// Declared column types, named the way the service schema declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    Integer,
    BigInteger,
    String,
    Text,
    Boolean,
    Float,
    Timestamp,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::BigInteger => "bigInteger",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Float => "float",
            ColumnType::Timestamp => "timestamp",
        }
    }

    /// Native SQLite declaration used in `ALTER TABLE ... ADD COLUMN`.
    pub const fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInteger => "BIGINT",
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Float => "FLOAT",
            ColumnType::Timestamp => "DATETIME",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub table: String,
    pub column: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(table: impl Into<String>, column: impl Into<String>, column_type: ColumnType) -> Self {
        ColumnSpec {
            table: table.into(),
            column: column.into(),
            column_type,
        }
    }
}

/// Columns the current application version needs that older databases may
/// lack.
const REQUIRED_COLUMNS: &[(&str, &str, ColumnType)] = &[
    ("files", "expirydate", ColumnType::Integer),
    ("albums", "editedAt", ColumnType::Integer),
    ("albums", "zipGeneratedAt", ColumnType::Integer),
    ("albums", "download", ColumnType::Integer),
    ("albums", "public", ColumnType::Integer),
    ("albums", "description", ColumnType::String),
    ("users", "enabled", ColumnType::Integer),
    ("users", "permission", ColumnType::Integer),
    ("users", "registration", ColumnType::Integer),
];

/// Ordered column declarations grouped by table. Tables keep the order in
/// which they were first seen; columns keep insertion order within a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    specs: Vec<ColumnSpec>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        let mut map = Self::new();
        for &(table, column, column_type) in REQUIRED_COLUMNS {
            map.push_grouped(ColumnSpec::new(table, column, column_type));
        }
        map
    }

    pub fn from_specs<I>(specs: I) -> MigrateResult<Self>
    where
        I: IntoIterator<Item = ColumnSpec>,
    {
        let mut map = Self::new();
        for spec in specs {
            map.insert(spec)?;
        }
        Ok(map)
    }

    /// Add a column; a second declaration of the same `(table, column)` pair
    /// is rejected. SQLite identifiers are case-insensitive, so is this check.
    pub fn insert(&mut self, spec: ColumnSpec) -> MigrateResult<()> {
        let duplicate = self.specs.iter().any(|s| {
            s.table.eq_ignore_ascii_case(&spec.table) && s.column.eq_ignore_ascii_case(&spec.column)
        });
        if duplicate {
            return Err(MigrateError::DuplicateColumn {
                table: spec.table,
                column: spec.column,
            });
        }
        self.push_grouped(spec);
        Ok(())
    }

    fn push_grouped(&mut self, spec: ColumnSpec) {
        match self.specs.iter().rposition(|s| s.table == spec.table) {
            Some(last) => self.specs.insert(last + 1, spec),
            None => self.specs.push(spec),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.specs.iter()
    }

    /// Distinct table names in application order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for spec in &self.specs {
            if !tables.contains(&spec.table.as_str()) {
                tables.push(&spec.table);
            }
        }
        tables
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether `table` currently has `column`. Always asks the database.
pub async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> MigrateResult<bool> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(pool)
    .await
    .map_err(MigrateError::connectivity)?;
    Ok(exists.is_some())
}

pub async fn has_table(pool: &SqlitePool, table: &str) -> MigrateResult<bool> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
    )
    .bind(table)
    .fetch_optional(pool)
    .await
    .map_err(MigrateError::connectivity)?;
    Ok(exists.is_some())
}

/// New columns are nullable with no default.
pub async fn add_column(pool: &SqlitePool, spec: &ColumnSpec) -> MigrateResult<()> {
    let sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(&spec.table),
        quote_ident(&spec.column),
        spec.column_type.sql_type()
    );
    sqlx::query(&sql).execute(pool).await.map_err(|source| {
        error!(
            target: "safekeep",
            event = "column_add_failed",
            table = %spec.table,
            column = %spec.column,
            error = %source
        );
        MigrateError::SchemaAlteration {
            table: spec.table.clone(),
            column: spec.column.clone(),
            source,
        }
    })?;
    Ok(())
}

/// Add every column of `map` that the database lacks, bumping `added` once
/// per column. With `dry_run` nothing is altered and `added` counts the
/// columns that would be added. On failure `added` still reflects the
/// columns added before it.
pub async fn apply_column_map(
    pool: &SqlitePool,
    map: &ColumnMap,
    dry_run: bool,
    added: &mut u64,
    on_event: &(dyn Fn(&MigrationEvent) + Send + Sync),
) -> MigrateResult<()> {
    for spec in map.iter() {
        if has_column(pool, &spec.table, &spec.column).await? {
            debug!(
                target: "safekeep",
                event = "column_present",
                table = %spec.table,
                column = %spec.column
            );
            continue;
        }

        if !dry_run {
            add_column(pool, spec).await?;
        }
        info!(
            target: "safekeep",
            event = "column_added",
            table = %spec.table,
            column = %spec.column,
            column_type = %spec.column_type,
            dry_run
        );
        on_event(&MigrationEvent::ColumnAdded {
            table: spec.table.clone(),
            column: spec.column.clone(),
            column_type: spec.column_type,
        });
        *added += 1;
    }
    Ok(())
}
