use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::{MigrateError, MigrateResult};
use crate::migrate::MigrationEvent;
use crate::schema::{has_column, quote_ident};

/// Classification written to files that were stored without one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Which rows a repair task touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSelector {
    /// Text ending in a spurious `.0`, e.g. `"1024.0"`.
    TrailingZeroFraction,
    /// Empty string or NULL.
    EmptyOrNull,
}

impl RowSelector {
    fn where_clause(self, field: &str) -> String {
        match self {
            RowSelector::TrailingZeroFraction => format!("{field} LIKE '%.0'"),
            RowSelector::EmptyOrNull => format!("({field} = '' OR {field} IS NULL)"),
        }
    }

    pub fn matches(self, value: Option<&str>) -> bool {
        match self {
            RowSelector::TrailingZeroFraction => value.is_some_and(|v| v.ends_with(".0")),
            RowSelector::EmptyOrNull => value.map_or(true, str::is_empty),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTransform {
    StripSuffix(&'static str),
    Set(&'static str),
}

impl FieldTransform {
    /// The rewritten value, or `None` when the row already holds what the
    /// transform would write.
    pub fn apply(&self, value: Option<&str>) -> Option<String> {
        match self {
            FieldTransform::StripSuffix(suffix) => value
                .and_then(|v| v.strip_suffix(suffix))
                .map(str::to_string),
            FieldTransform::Set(target) => {
                if value == Some(*target) {
                    None
                } else {
                    Some((*target).to_string())
                }
            }
        }
    }
}

/// A row fixup over `table.field`, addressed by the integer `id` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairTask {
    pub name: String,
    pub table: String,
    pub field: String,
    /// Human description used in progress output.
    pub issue: String,
    pub selector: RowSelector,
    pub transform: FieldTransform,
}

impl RepairTask {
    pub fn normalize_size() -> Self {
        RepairTask {
            name: "normalize_size".into(),
            table: "files".into(),
            field: "size".into(),
            issue: "outdated \"size\" field".into(),
            selector: RowSelector::TrailingZeroFraction,
            transform: FieldTransform::StripSuffix(".0"),
        }
    }

    pub fn backfill_type() -> Self {
        RepairTask {
            name: "backfill_type".into(),
            table: "files".into(),
            field: "type".into(),
            issue: "invalid \"type\" field".into(),
            selector: RowSelector::EmptyOrNull,
            transform: FieldTransform::Set(FALLBACK_CONTENT_TYPE),
        }
    }

    pub fn defaults() -> Vec<RepairTask> {
        vec![Self::normalize_size(), Self::backfill_type()]
    }
}

/// Run one task, bumping `repaired` once per rewritten row. Rows are updated
/// one at a time; a failing update leaves earlier rows rewritten and counted.
pub async fn run_task(
    pool: &SqlitePool,
    task: &RepairTask,
    dry_run: bool,
    repaired: &mut u64,
    on_event: &(dyn Fn(&MigrationEvent) + Send + Sync),
) -> MigrateResult<()> {
    let table = quote_ident(&task.table);
    let field = quote_ident(&task.field);
    let value = if has_column(pool, &task.table, &task.field).await? {
        field.clone()
    } else if dry_run {
        // A dry run leaves pending columns unadded; they would read as NULL.
        debug!(
            target: "safekeep",
            event = "repair_pending_column",
            task = %task.name,
            table = %task.table,
            field = %task.field
        );
        "NULL".to_string()
    } else {
        return Err(MigrateError::data_repair(
            &task.name,
            None,
            format!("column {}.{} does not exist", task.table, task.field),
        ));
    };

    let select = format!(
        "SELECT id, CAST({value} AS TEXT) AS value FROM {table} WHERE {} ORDER BY id",
        task.selector.where_clause(&value)
    );
    let rows = sqlx::query(&select)
        .fetch_all(pool)
        .await
        .map_err(|err| MigrateError::data_repair(&task.name, None, err))?;

    if rows.is_empty() {
        debug!(target: "safekeep", event = "repair_clean", task = %task.name);
        return Ok(());
    }

    info!(
        target: "safekeep",
        event = "repair_batch",
        task = %task.name,
        table = %task.table,
        field = %task.field,
        rows = rows.len(),
        dry_run
    );
    on_event(&MigrationEvent::RepairBatch {
        task: task.name.clone(),
        issue: task.issue.clone(),
        rows: rows.len() as u64,
    });

    let update = format!("UPDATE {table} SET {field} = ?1 WHERE id = ?2");
    for row in rows {
        let id: i64 = row
            .try_get("id")
            .map_err(|err| MigrateError::data_repair(&task.name, None, err))?;
        let value: Option<String> = row
            .try_get("value")
            .map_err(|err| MigrateError::data_repair(&task.name, Some(id), err))?;

        let Some(new_value) = task.transform.apply(value.as_deref()) else {
            continue;
        };
        if !dry_run {
            sqlx::query(&update)
                .bind(&new_value)
                .bind(id)
                .execute(pool)
                .await
                .map_err(|err| MigrateError::data_repair(&task.name, Some(id), err))?;
        }
        debug!(
            target: "safekeep",
            event = "repair_row",
            task = %task.name,
            id,
            from = ?value,
            to = %new_value
        );
        *repaired += 1;
    }
    Ok(())
}

/// Run `tasks` in order, stopping at the first failure.
pub async fn run_repairs(
    pool: &SqlitePool,
    tasks: &[RepairTask],
    dry_run: bool,
    repaired: &mut u64,
    on_event: &(dyn Fn(&MigrationEvent) + Send + Sync),
) -> MigrateResult<()> {
    for task in tasks {
        run_task(pool, task, dry_run, repaired, on_event).await?;
    }
    Ok(())
}
