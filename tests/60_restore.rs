mod common;

use anyhow::Result;
use sqlx::PgPool;

use tenant_cms_api::database::DatabaseManager;
use tenant_cms_api::ops::{BackupService, BackupTrigger};

/// Far above any shipped migration
const RELEASE_MIGRATION: &str = "9001_feature_flags.sql";

async fn table_exists(pool: &PgPool, name: &str) -> Result<bool> {
    Ok(sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(name)
        .fetch_one(pool)
        .await?)
}

/// Needs pg_dump, psql and tar on PATH besides the test database
#[tokio::test]
async fn restore_drops_tables_added_after_the_backup() -> Result<()> {
    let Some(db) = common::test_database().await? else { return Ok(()) };
    let backups = BackupService::new(db.ops());

    let backup = backups.run_now(BackupTrigger::PreUpdate, None).await?;

    let package = db.config.updates.releases_dir.join("9.0.1").join("migrations");
    tokio::fs::create_dir_all(&package).await?;
    tokio::fs::write(
        package.join(RELEASE_MIGRATION),
        "CREATE TABLE feature_flags (name TEXT PRIMARY KEY, enabled BOOLEAN NOT NULL DEFAULT FALSE);",
    )
    .await?;
    DatabaseManager::migrate_from_dir(&db.pool, &package).await?;
    assert!(table_exists(&db.pool, "public.feature_flags").await?);

    backups.restore_now(backup.id, None).await?;
    assert!(!table_exists(&db.pool, "public.feature_flags").await?);
    assert!(table_exists(&db.pool, "public.tenants").await?);

    // The ledger is outside the dump and keeps the backup record
    assert_eq!(backups.get(backup.id).await?.id, backup.id);

    // Migration history was rewound with the schema, so the release applies again
    DatabaseManager::migrate_from_dir(&db.pool, &package).await?;
    assert!(table_exists(&db.pool, "public.feature_flags").await?);

    backups.restore_now(backup.id, None).await?;
    backups.delete(backup.id).await?;
    Ok(())
}
