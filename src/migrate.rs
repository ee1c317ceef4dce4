//! Migration orchestrator.
//!
//! A run walks a fixed sequence of stages against the live database,
//! deciding what to do by inspecting current state rather than consulting a
//! version table:
//!
//! `NotStarted -> ProbingPrerequisites -> ApplyingSchema -> RepairingData ->
//! PromotingAccount -> Completed`
//!
//! Any stage can end the run in `Aborted`. A missing database file is a
//! fresh install and completes immediately with nothing done.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::config::MigrateConfig;
use crate::db::open_pool;
use crate::error::{MigrateError, MigrateResult};
use crate::permissions::Permission;
use crate::promote::promote_account;
use crate::repair::{run_repairs, RepairTask};
use crate::schema::{apply_column_map, has_table, ColumnMap, ColumnType};

/// Progress reported while a run mutates (or, in a dry run, would mutate)
/// the database. The `Display` form is the console line for the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MigrationEvent {
    /// The database file does not exist yet; nothing is migrated.
    FreshInstall {
        path: String,
    },
    ColumnAdded {
        table: String,
        column: String,
        column_type: ColumnType,
    },
    RepairBatch {
        task: String,
        issue: String,
        rows: u64,
    },
    AccountPromoted {
        account: String,
        level: i64,
    },
}

impl fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationEvent::FreshInstall { path } => {
                write!(f, "Database file {path} does not exist yet.")
            }
            MigrationEvent::ColumnAdded {
                table,
                column,
                column_type,
            } => write!(f, "{table} <- {column} ({column_type})"),
            MigrationEvent::RepairBatch { issue, rows, .. } => {
                write!(f, "Found {rows} rows with {issue}, converting...")
            }
            MigrationEvent::AccountPromoted { account, level } => {
                let name = Permission::from_level(*level)
                    .map(Permission::as_str)
                    .unwrap_or("custom");
                write!(f, "Updated \"{account}\"'s permission to {level} ({name}).")
            }
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&MigrationEvent) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    #[default]
    NotStarted,
    ProbingPrerequisites,
    ApplyingSchema,
    RepairingData,
    PromotingAccount,
    Completed,
    Aborted,
}

/// Result of one run. Lives only as long as the run; the database schema
/// itself is the durable record.
#[derive(Debug, Default, Serialize)]
pub struct MigrationOutcome {
    pub stage: MigrationStage,
    pub actions_applied: u64,
    pub columns_added: u64,
    pub rows_repaired: u64,
    pub accounts_promoted: u64,
    pub aborted: bool,
    pub fresh_install: bool,
    pub dry_run: bool,
    pub errors: Vec<MigrateError>,
    pub duration_ms: u64,
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        self.stage == MigrationStage::Completed
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn error(&self) -> Option<&MigrateError> {
        self.errors.first()
    }

    pub fn summary_line(&self) -> String {
        let n = self.actions_applied;
        if self.aborted {
            format!("Migration aborted after {n} database migration task(s).")
        } else if self.fresh_install {
            "Database file missing. Assuming first install, migration skipped.".to_string()
        } else if n == 0 {
            "Database migration was not required.".to_string()
        } else if self.dry_run {
            format!("{n} database migration task(s) pending.")
        } else {
            format!("Completed {n} database migration task(s).")
        }
    }

    fn tally(&mut self) {
        self.actions_applied = self.columns_added + self.rows_repaired + self.accounts_promoted;
    }
}

pub struct Migrator {
    config: MigrateConfig,
    columns: ColumnMap,
    repairs: Vec<RepairTask>,
    dry_run: bool,
    on_event: Option<EventHandler>,
}

impl Migrator {
    /// Migrator for the required columns and the built-in repair tasks.
    pub fn new(config: MigrateConfig) -> Self {
        Migrator {
            config,
            columns: ColumnMap::required(),
            repairs: RepairTask::defaults(),
            dry_run: false,
            on_event: None,
        }
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_repairs(mut self, repairs: Vec<RepairTask>) -> Self {
        self.repairs = repairs;
        self
    }

    pub fn with_event_handler(mut self, handler: EventHandler) -> Self {
        self.on_event = Some(handler);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> MigrationOutcome {
        let started = Instant::now();
        let mut outcome = MigrationOutcome {
            dry_run: self.dry_run,
            ..MigrationOutcome::default()
        };

        if let Err(err) = self.run_stages(&mut outcome).await {
            error!(
                target: "safekeep",
                event = "migrate_error",
                stage = ?outcome.stage,
                code = err.code(),
                error = %err,
                actions_applied = outcome.actions_applied
            );
            outcome.aborted = true;
            outcome.errors.push(err);
            enter(&mut outcome, MigrationStage::Aborted);
        }

        outcome.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            target: "safekeep",
            event = "migrate_complete",
            stage = ?outcome.stage,
            actions_applied = outcome.actions_applied,
            columns_added = outcome.columns_added,
            rows_repaired = outcome.rows_repaired,
            accounts_promoted = outcome.accounts_promoted,
            dry_run = outcome.dry_run,
            duration_ms = outcome.duration_ms
        );
        outcome
    }

    async fn run_stages(&self, outcome: &mut MigrationOutcome) -> MigrateResult<()> {
        enter(outcome, MigrationStage::ProbingPrerequisites);
        let Some(pool) = self.probe_prerequisites(outcome).await? else {
            enter(outcome, MigrationStage::Completed);
            return Ok(());
        };

        let result = self.apply_stages(&pool, outcome).await;
        pool.close().await;
        result?;

        enter(outcome, MigrationStage::Completed);
        Ok(())
    }

    /// `None` means fresh install: there is no database to migrate.
    async fn probe_prerequisites(
        &self,
        outcome: &mut MigrationOutcome,
    ) -> MigrateResult<Option<SqlitePool>> {
        let client = self.config.database.client()?;
        let path = self.config.database.database_file()?;

        if client.is_file_based() && !path.exists() {
            info!(
                target: "safekeep",
                event = "fresh_install",
                path = %path.display()
            );
            outcome.fresh_install = true;
            self.emit(&MigrationEvent::FreshInstall {
                path: path.display().to_string(),
            });
            return Ok(None);
        }

        let pool = open_pool(path).await?;
        if let Err(err) = self.check_tables(&pool).await {
            pool.close().await;
            return Err(err);
        }
        Ok(Some(pool))
    }

    fn emit(&self, event: &MigrationEvent) {
        if let Some(handler) = &self.on_event {
            handler(event);
        }
    }

    async fn check_tables(&self, pool: &SqlitePool) -> MigrateResult<()> {
        let mut tables = self.columns.tables();
        for task in &self.repairs {
            if !tables.contains(&task.table.as_str()) {
                tables.push(&task.table);
            }
        }
        if self.config.superadmin_force_promote && !tables.contains(&"users") {
            tables.push("users");
        }

        for table in tables {
            if !has_table(pool, table).await? {
                return Err(MigrateError::MissingTable(table.to_string()));
            }
        }
        Ok(())
    }

    async fn apply_stages(
        &self,
        pool: &SqlitePool,
        outcome: &mut MigrationOutcome,
    ) -> MigrateResult<()> {
        let emit = |event: &MigrationEvent| self.emit(event);

        enter(outcome, MigrationStage::ApplyingSchema);
        let result = apply_column_map(
            pool,
            &self.columns,
            self.dry_run,
            &mut outcome.columns_added,
            &emit,
        )
        .await;
        outcome.tally();
        result?;

        enter(outcome, MigrationStage::RepairingData);
        let result = run_repairs(
            pool,
            &self.repairs,
            self.dry_run,
            &mut outcome.rows_repaired,
            &emit,
        )
        .await;
        outcome.tally();
        result?;

        enter(outcome, MigrationStage::PromotingAccount);
        let policy = self.config.privileged_policy();
        if promote_account(pool, &policy, self.dry_run, &emit).await? {
            outcome.accounts_promoted += 1;
        }
        outcome.tally();
        Ok(())
    }
}

fn enter(outcome: &mut MigrationOutcome, stage: MigrationStage) {
    outcome.stage = stage;
    info!(target: "safekeep", event = "migrate_stage", stage = ?stage);
}
