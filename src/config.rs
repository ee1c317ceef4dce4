use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MigrateError, MigrateResult};
use crate::permissions::Permission;
use crate::promote::PrivilegedAccountPolicy;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_PATH_ENV: &str = "SAFEKEEP_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// The subset of the service configuration the migrator reads. Other keys in
/// the file are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub superadmin_account: Option<String>,
    #[serde(default)]
    pub superadmin_force_promote: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub client: String,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub filename: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseClient {
    Sqlite3,
    BetterSqlite3,
}

impl DatabaseClient {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sqlite3" => Some(DatabaseClient::Sqlite3),
            "better-sqlite3" => Some(DatabaseClient::BetterSqlite3),
            _ => None,
        }
    }

    /// Both supported clients keep the whole database in a single file.
    pub fn is_file_based(self) -> bool {
        matches!(self, DatabaseClient::Sqlite3 | DatabaseClient::BetterSqlite3)
    }
}

impl MigrateConfig {
    /// Config pointing at a SQLite file, with the privileged-account policy off.
    pub fn sqlite(filename: impl Into<PathBuf>) -> Self {
        MigrateConfig {
            database: DatabaseConfig {
                client: "sqlite3".into(),
                connection: ConnectionConfig {
                    filename: Some(filename.into()),
                },
            },
            superadmin_account: None,
            superadmin_force_promote: false,
        }
    }

    /// Load a JSON config file. A relative database filename is resolved
    /// against the directory holding the config file.
    pub fn from_path(path: &Path) -> MigrateResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            MigrateError::configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        let mut config = Self::from_json(&raw).map_err(|err| match err {
            MigrateError::Configuration(msg) => {
                MigrateError::configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;

        if let Some(filename) = config.database.connection.filename.as_mut() {
            if filename.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                *filename = base.join(&*filename);
            }
        }
        Ok(config)
    }

    pub fn from_json(raw: &str) -> MigrateResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| MigrateError::configuration(format!("invalid config: {err}")))
    }

    pub fn with_database_file(mut self, filename: impl Into<PathBuf>) -> Self {
        self.database.connection.filename = Some(filename.into());
        self
    }

    pub fn with_superadmin(mut self, account: Option<&str>, force_promote: bool) -> Self {
        self.superadmin_account = account.map(str::to_string);
        self.superadmin_force_promote = force_promote;
        self
    }

    pub fn privileged_policy(&self) -> PrivilegedAccountPolicy {
        PrivilegedAccountPolicy {
            enabled: self.superadmin_force_promote,
            account: self.superadmin_account.clone(),
            required_level: Permission::Superadmin.level(),
        }
    }
}

impl DatabaseConfig {
    pub fn client(&self) -> MigrateResult<DatabaseClient> {
        DatabaseClient::parse(&self.client).ok_or_else(|| {
            MigrateError::configuration(format!(
                "unsupported database client \"{}\" (expected sqlite3 or better-sqlite3)",
                self.client
            ))
        })
    }

    pub fn database_file(&self) -> MigrateResult<&Path> {
        self.connection
            .filename
            .as_deref()
            .ok_or_else(|| MigrateError::configuration("database.connection.filename is not set"))
    }
}
