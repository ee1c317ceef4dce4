#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use safekeep_lib::{EventHandler, MigrationEvent};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Tables as the oldest supported release created them, before any of the
/// required columns existed.
pub const LEGACY_SCHEMA: &[&str] = &[
    "CREATE TABLE files (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        userid INTEGER,\
        name VARCHAR(255),\
        original VARCHAR(255),\
        type VARCHAR(255),\
        size VARCHAR(255),\
        hash VARCHAR(255),\
        ip VARCHAR(255),\
        albumid INTEGER,\
        timestamp INTEGER\
    )",
    "CREATE TABLE albums (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        userid INTEGER,\
        name VARCHAR(255),\
        identifier VARCHAR(255),\
        enabled INTEGER,\
        timestamp INTEGER\
    )",
    "CREATE TABLE users (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        username VARCHAR(255),\
        password VARCHAR(255),\
        token VARCHAR(255),\
        timestamp INTEGER\
    )",
];

pub async fn temp_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("connect sqlite::memory:")
}

pub async fn legacy_pool() -> SqlitePool {
    let pool = temp_pool().await;
    for stmt in LEGACY_SCHEMA {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool
}

pub async fn open_file_pool_creating(path: &Path) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
        .await
        .expect("create sqlite file")
}

/// Create a legacy database file at `path` and leave it closed.
pub async fn create_legacy_db(path: &Path) {
    let pool = open_file_pool_creating(path).await;
    for stmt in LEGACY_SCHEMA {
        sqlx::query(stmt).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

pub async fn open_file_pool(path: &Path) -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(path))
        .await
        .expect("open sqlite file")
}

pub async fn columns(pool: &SqlitePool, table: &str) -> Vec<String> {
    sqlx::query("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
        .bind(table)
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
}

pub async fn insert_file(pool: &SqlitePool, name: &str, size: Option<&str>, kind: Option<&str>) -> i64 {
    sqlx::query("INSERT INTO files (name, size, type) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(size)
        .bind(kind)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn file_field(pool: &SqlitePool, id: i64, field: &str) -> Option<String> {
    let sql = format!("SELECT \"{field}\" FROM files WHERE id = ?1");
    sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn ignore_events(_: &MigrationEvent) {}

/// Collects every event a run reports.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<MigrationEvent>>>);

impl EventLog {
    pub fn handler(&self) -> EventHandler {
        let events = self.0.clone();
        Arc::new(move |event: &MigrationEvent| events.lock().unwrap().push(event.clone()))
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(ToString::to_string).collect()
    }

    pub fn push(&self, event: &MigrationEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}
