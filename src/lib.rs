pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod permissions;
pub mod promote;
pub mod repair;
pub mod schema;

pub use config::MigrateConfig;
pub use error::{MigrateError, MigrateResult};
pub use migrate::{EventHandler, MigrationEvent, MigrationOutcome, MigrationStage, Migrator};

/// Crate version plus the commit it was built from.
pub fn build_info() -> (&'static str, &'static str) {
    (env!("CARGO_PKG_VERSION"), env!("SAFEKEEP_GIT_HASH"))
}
