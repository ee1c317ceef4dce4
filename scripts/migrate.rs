use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use safekeep_lib::config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE};
use safekeep_lib::{build_info, logging, MigrateConfig, MigrationEvent, Migrator};
use tracing::info;

const READY_HINT: &str = "You may now start safekeep normally.";

#[derive(Parser)]
#[command(name = "migrate", about = "Bring the safekeep database up to date")]
struct Cli {
    /// Config file (defaults to $SAFEKEEP_CONFIG, then ./config.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use this SQLite file instead of the configured one
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Report pending changes without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Print the run outcome as JSON after the summary line
    #[arg(long)]
    json_summary: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let (version, commit) = build_info();
    info!(
        target: "safekeep",
        event = "migrate_start",
        version,
        commit,
        dry_run = cli.dry_run
    );

    let config = load_config(&cli)?;
    let dry_run = cli.dry_run;
    let migrator = Migrator::new(config)
        .dry_run(dry_run)
        .with_event_handler(Arc::new(move |event: &MigrationEvent| {
            if dry_run {
                println!("(dry run) {event}");
            } else {
                println!("{event}");
            }
        }));

    let outcome = migrator.run().await;
    if outcome.is_success() && !outcome.dry_run && !outcome.fresh_install {
        println!("{} {READY_HINT}", outcome.summary_line());
    } else {
        println!("{}", outcome.summary_line());
    }
    if cli.json_summary {
        let json = serde_json::to_string_pretty(&outcome).context("serialize outcome")?;
        println!("{json}");
    }
    if let Some(err) = outcome.error() {
        eprintln!("Error: {err}");
    }

    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// An explicit `--config` must exist. Without one, `--db` alone is enough to
/// run against a bare SQLite file.
fn load_config(cli: &Cli) -> Result<MigrateConfig> {
    let explicit = cli.config.is_some();
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let config = match &cli.db {
        Some(db) if !explicit && !path.exists() => MigrateConfig::sqlite(db),
        Some(db) => MigrateConfig::from_path(&path)?.with_database_file(db),
        None => MigrateConfig::from_path(&path)?,
    };
    Ok(config)
}
