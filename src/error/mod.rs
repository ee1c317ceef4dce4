use serde::{Serialize, Serializer};
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Fatal failures of a migration run. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("database is unreachable: {source}")]
    Connectivity {
        #[source]
        source: SqlxError,
    },
    #[error("failed to add column {table}.{column}: {source}")]
    SchemaAlteration {
        table: String,
        column: String,
        #[source]
        source: SqlxError,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("privileged account \"{0}\" was not found in the database")]
    AccountNotFound(String),
    #[error("data repair task {task} failed{}: {message}", row_suffix(.row_id))]
    DataRepair {
        task: String,
        row_id: Option<i64>,
        message: String,
    },
    #[error("required table {0} does not exist")]
    MissingTable(String),
    #[error("column {table}.{column} is declared more than once")]
    DuplicateColumn { table: String, column: String },
}

pub type MigrateResult<T> = std::result::Result<T, MigrateError>;

fn row_suffix(row_id: &Option<i64>) -> String {
    match row_id {
        Some(id) => format!(" on row {id}"),
        None => String::new(),
    }
}

impl MigrateError {
    /// Machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            MigrateError::Connectivity { .. } => "MIGRATE/CONNECTIVITY",
            MigrateError::SchemaAlteration { .. } => "MIGRATE/SCHEMA_ALTERATION",
            MigrateError::Configuration(_) => "MIGRATE/CONFIGURATION",
            MigrateError::AccountNotFound(_) => "MIGRATE/ACCOUNT_NOT_FOUND",
            MigrateError::DataRepair { .. } => "MIGRATE/DATA_REPAIR",
            MigrateError::MissingTable(_) => "MIGRATE/MISSING_TABLE",
            MigrateError::DuplicateColumn { .. } => "MIGRATE/DUPLICATE_COLUMN",
        }
    }

    pub fn connectivity(source: SqlxError) -> Self {
        MigrateError::Connectivity { source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        MigrateError::Configuration(message.into())
    }

    pub fn data_repair(task: &str, row_id: Option<i64>, source: impl std::fmt::Display) -> Self {
        MigrateError::DataRepair {
            task: task.to_string(),
            row_id,
            message: source.to_string(),
        }
    }
}

/// Flat `{code, message}` shape used by the JSON summary.
impl Serialize for MigrateError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("MigrateError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
