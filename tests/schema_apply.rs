#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use safekeep_lib::schema::{
    add_column, apply_column_map, has_column, ColumnMap, ColumnSpec, ColumnType,
};
use safekeep_lib::{MigrateError, MigrationEvent};

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn adds_every_required_column_then_nothing() {
    let pool = util::legacy_pool().await;
    let log = util::EventLog::default();
    let on_event = |event: &MigrationEvent| log.push(event);
    let map = ColumnMap::required();

    let mut added = 0;
    apply_column_map(&pool, &map, false, &mut added, &on_event)
        .await
        .unwrap();
    assert_eq!(added, 9);
    assert_eq!(
        log.lines(),
        vec![
            "files <- expirydate (integer)",
            "albums <- editedAt (integer)",
            "albums <- zipGeneratedAt (integer)",
            "albums <- download (integer)",
            "albums <- public (integer)",
            "albums <- description (string)",
            "users <- enabled (integer)",
            "users <- permission (integer)",
            "users <- registration (integer)",
        ]
    );

    let albums = util::columns(&pool, "albums").await;
    for column in ["editedAt", "zipGeneratedAt", "download", "public", "description"] {
        assert!(albums.contains(&column.to_string()), "albums missing {column}");
    }
    let before = (
        util::columns(&pool, "files").await,
        albums,
        util::columns(&pool, "users").await,
    );

    let mut second = 0;
    apply_column_map(&pool, &map, false, &mut second, &on_event)
        .await
        .unwrap();
    assert_eq!(second, 0);
    assert_eq!(log.lines().len(), 9, "second pass reports nothing");
    let after = (
        util::columns(&pool, "files").await,
        util::columns(&pool, "albums").await,
        util::columns(&pool, "users").await,
    );
    assert_eq!(before, after);
}

#[tokio::test]
async fn existing_columns_are_skipped_and_not_counted() {
    let pool = util::legacy_pool().await;
    sqlx::query("ALTER TABLE albums ADD COLUMN editedAt INTEGER")
        .execute(&pool)
        .await
        .unwrap();
    // SQLite column names are case-insensitive.
    sqlx::query("ALTER TABLE users ADD COLUMN PERMISSION INTEGER")
        .execute(&pool)
        .await
        .unwrap();

    let mut added = 0;
    apply_column_map(
        &pool,
        &ColumnMap::required(),
        false,
        &mut added,
        &util::ignore_events,
    )
    .await
    .unwrap();
    assert_eq!(added, 7);
}

#[tokio::test]
async fn new_column_types_are_native_and_nullable() {
    let pool = util::legacy_pool().await;
    let mut added = 0;
    apply_column_map(
        &pool,
        &ColumnMap::required(),
        false,
        &mut added,
        &util::ignore_events,
    )
    .await
    .unwrap();

    let (decl, notnull, default): (String, i64, Option<String>) = sqlx::query_as(
        "SELECT type, \"notnull\", dflt_value FROM pragma_table_info('albums') WHERE name = 'description'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(decl, "VARCHAR(255)");
    assert_eq!(notnull, 0);
    assert_eq!(default, None);

    sqlx::query("INSERT INTO albums (name) VALUES ('holiday')")
        .execute(&pool)
        .await
        .unwrap();
    let download: Option<i64> = sqlx::query_scalar("SELECT download FROM albums")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(download, None);
}

#[tokio::test]
async fn probe_sees_columns_added_during_the_run() {
    let pool = util::legacy_pool().await;
    assert!(!has_column(&pool, "files", "expirydate").await.unwrap());
    add_column(
        &pool,
        &ColumnSpec::new("files", "expirydate", ColumnType::Integer),
    )
    .await
    .unwrap();
    assert!(has_column(&pool, "files", "expirydate").await.unwrap());
    assert!(has_column(&pool, "files", "EXPIRYDATE").await.unwrap());
    assert!(!has_column(&pool, "ghost", "expirydate").await.unwrap());
}

#[tokio::test]
async fn failed_alteration_keeps_earlier_columns() {
    let pool = util::legacy_pool().await;
    let map = ColumnMap::from_specs([
        ColumnSpec::new("files", "expirydate", ColumnType::Integer),
        ColumnSpec::new("ghost", "haunted", ColumnType::Boolean),
        ColumnSpec::new("users", "enabled", ColumnType::Integer),
    ])
    .unwrap();

    let mut added = 0;
    let err = apply_column_map(&pool, &map, false, &mut added, &util::ignore_events)
        .await
        .unwrap_err();
    match err {
        MigrateError::SchemaAlteration { table, column, .. } => {
            assert_eq!(table, "ghost");
            assert_eq!(column, "haunted");
        }
        other => panic!("expected SchemaAlteration, got {other:?}"),
    }
    assert_eq!(added, 1);
    assert!(has_column(&pool, "files", "expirydate").await.unwrap());
    assert!(!has_column(&pool, "users", "enabled").await.unwrap());
}

#[tokio::test]
async fn dry_run_counts_without_altering() {
    let pool = util::legacy_pool().await;
    let mut pending = 0;
    apply_column_map(
        &pool,
        &ColumnMap::required(),
        true,
        &mut pending,
        &util::ignore_events,
    )
    .await
    .unwrap();
    assert_eq!(pending, 9);
    assert!(!has_column(&pool, "albums", "description").await.unwrap());
}

fn required_specs() -> Vec<ColumnSpec> {
    ColumnMap::required().iter().cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn applying_twice_matches_applying_once(
        selected in proptest::collection::vec(any::<bool>(), 9),
        preexisting in proptest::collection::vec(any::<bool>(), 9),
    ) {
        let runtime = tokio::runtime::Runtime::new().expect("create tokio runtime");
        let (first, second, once, twice, expected) = runtime.block_on(async move {
            let pool = util::legacy_pool().await;
            let specs = required_specs();

            for (spec, &present) in specs.iter().zip(&preexisting) {
                if present {
                    add_column(&pool, spec).await.unwrap();
                }
            }
            let map = ColumnMap::from_specs(
                specs
                    .iter()
                    .zip(&selected)
                    .filter(|(_, &keep)| keep)
                    .map(|(spec, _)| spec.clone()),
            )
            .unwrap();
            let expected = selected
                .iter()
                .zip(&preexisting)
                .filter(|(&keep, &present)| keep && !present)
                .count() as u64;

            let mut first = 0;
            apply_column_map(&pool, &map, false, &mut first, &util::ignore_events)
                .await
                .unwrap();
            let once = snapshot(&pool).await;

            let mut second = 0;
            apply_column_map(&pool, &map, false, &mut second, &util::ignore_events)
                .await
                .unwrap();
            let twice = snapshot(&pool).await;
            (first, second, once, twice, expected)
        });

        prop_assert_eq!(first, expected);
        prop_assert_eq!(second, 0);
        prop_assert_eq!(once, twice);
    }
}

async fn snapshot(pool: &sqlx::SqlitePool) -> Vec<Vec<String>> {
    let mut tables = Vec::new();
    for table in ["files", "albums", "users"] {
        tables.push(util::columns(pool, table).await);
    }
    tables
}
