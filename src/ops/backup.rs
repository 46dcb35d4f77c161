use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use super::checksum::{digests_match, sha256_file};
use super::workdir::WorkDir;
use super::{process, OpsContext, OpsError};
use crate::database::{DatabaseError, Paginated, Pagination};
use crate::jobs::{JobKind, Operation, ScopedProgress};

const DUMP_FILE: &str = "database.sql";
const MANIFEST_FILE: &str = "backup.json";
const ARCHIVE_FORMAT: u32 = 1;

/// Schema covered by dumps. Operation history lives in `ops`, outside the
/// dump, so a restore cannot rewind it.
pub const DUMP_SCHEMA: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupTrigger {
    Manual,
    Scheduled,
    PreUpdate,
}

impl BackupTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupTrigger::Manual => "manual",
            BackupTrigger::Scheduled => "scheduled",
            BackupTrigger::PreUpdate => "pre_update",
        }
    }
}

impl fmt::Display for BackupTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(BackupTrigger::Manual),
            "scheduled" => Ok(BackupTrigger::Scheduled),
            "pre_update" => Ok(BackupTrigger::PreUpdate),
            other => Err(format!("unknown backup trigger '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Backup {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub file_name: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub includes_media: bool,
    pub trigger: BackupTrigger,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct BackupRow {
    id: Uuid,
    operation_id: Uuid,
    file_name: String,
    file_path: String,
    size_bytes: i64,
    checksum: String,
    includes_media: bool,
    trigger: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BackupRow> for Backup {
    type Error = DatabaseError;

    fn try_from(row: BackupRow) -> Result<Self, Self::Error> {
        Ok(Backup {
            id: row.id,
            operation_id: row.operation_id,
            file_name: row.file_name,
            file_path: row.file_path,
            size_bytes: row.size_bytes,
            checksum: row.checksum,
            includes_media: row.includes_media,
            trigger: row.trigger.parse().map_err(DatabaseError::Invalid)?,
            created_at: row.created_at,
        })
    }
}

const COLUMNS: &str = "id, operation_id, file_name, file_path, size_bytes, checksum, includes_media, trigger, created_at";

/// `backup.json` inside every archive
#[derive(Debug, Serialize, Deserialize)]
struct ArchiveManifest {
    format: u32,
    app_version: String,
    created_at: DateTime<Utc>,
    /// Name of the media directory stored next to the dump, if any
    media_dir: Option<String>,
}

/// Database dumps plus media archives, and restoring them
#[derive(Clone)]
pub struct BackupService {
    ctx: OpsContext,
}

impl BackupService {
    pub fn new(ctx: OpsContext) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, pagination: Pagination) -> Result<Paginated<Backup>, OpsError> {
        let sql = format!(
            "SELECT {} FROM ops.backups ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            COLUMNS
        );
        let rows: Vec<BackupRow> = sqlx::query_as(&sql)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.ctx.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ops.backups")
            .fetch_one(&self.ctx.pool)
            .await?;

        let items = rows.into_iter().map(Backup::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, pagination, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Backup, OpsError> {
        let sql = format!("SELECT {} FROM ops.backups WHERE id = $1", COLUMNS);
        let row: Option<BackupRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.ctx.pool).await?;
        match row {
            Some(row) => Ok(row.try_into()?),
            None => Err(OpsError::NotFound("Backup")),
        }
    }

    /// Remove the archive and its record. A missing file only logs.
    pub async fn delete(&self, id: Uuid) -> Result<(), OpsError> {
        let backup = self.get(id).await?;
        remove_archive(Path::new(&backup.file_path)).await;
        sqlx::query("DELETE FROM ops.backups WHERE id = $1")
            .bind(id)
            .execute(&self.ctx.pool)
            .await?;
        tracing::info!(backup_id = %id, "Deleted backup {}", backup.file_name);
        Ok(())
    }

    /// Queue a backup on the job registry and return the pending operation
    pub async fn start(&self, trigger: BackupTrigger, requested_by: Option<Uuid>) -> Result<Operation, OpsError> {
        let (ticket, operation) = self.ctx.begin(JobKind::Backup, requested_by).await?;
        let service = self.clone();
        let operation_id = operation.id;

        self.ctx.registry.spawn(ticket, self.ctx.store.clone(), async move {
            let progress = service.ctx.reporter(operation_id).scoped(0, 100);
            let work = service.create_archive(operation_id, trigger, &progress);
            // Failures are recorded on the operation by drive()
            let _ = service.ctx.drive(operation_id, work).await;
        });

        Ok(operation)
    }

    /// Run a backup in the current task. Used by the scheduler and the CLI.
    pub async fn run_now(&self, trigger: BackupTrigger, requested_by: Option<Uuid>) -> Result<Backup, OpsError> {
        let (ticket, operation) = self.ctx.begin(JobKind::Backup, requested_by).await?;
        let progress = self.ctx.reporter(operation.id).scoped(0, 100);
        let result = self
            .ctx
            .drive(operation.id, self.create_archive(operation.id, trigger, &progress))
            .await;
        self.ctx.registry.finish(ticket).await;
        result
    }

    pub async fn start_restore(&self, backup_id: Uuid, requested_by: Option<Uuid>) -> Result<Operation, OpsError> {
        let backup = self.get(backup_id).await?;
        let (ticket, operation) = self.ctx.begin(JobKind::Restore, requested_by).await?;
        let service = self.clone();
        let operation_id = operation.id;

        self.ctx.registry.spawn(ticket, self.ctx.store.clone(), async move {
            let progress = service.ctx.reporter(operation_id).scoped(0, 100);
            let work = service.restore_archive(&backup, operation_id, &progress);
            let _ = service.ctx.drive(operation_id, work).await;
        });

        Ok(operation)
    }

    pub async fn restore_now(&self, backup_id: Uuid, requested_by: Option<Uuid>) -> Result<(), OpsError> {
        let backup = self.get(backup_id).await?;
        let (ticket, operation) = self.ctx.begin(JobKind::Restore, requested_by).await?;
        let progress = self.ctx.reporter(operation.id).scoped(0, 100);
        let result = self
            .ctx
            .drive(operation.id, self.restore_archive(&backup, operation.id, &progress))
            .await;
        self.ctx.registry.finish(ticket).await;
        result
    }

    /// Delete scheduled backups beyond the newest `keep`. Manual and
    /// pre-update backups are never pruned.
    pub async fn prune_scheduled(&self, keep: usize) -> Result<u64, OpsError> {
        let sql = format!(
            "SELECT {} FROM ops.backups WHERE trigger = 'scheduled' ORDER BY created_at DESC OFFSET $1",
            COLUMNS
        );
        let rows: Vec<BackupRow> = sqlx::query_as(&sql)
            .bind(keep as i64)
            .fetch_all(&self.ctx.pool)
            .await?;

        let mut pruned = 0;
        for row in rows {
            remove_archive(Path::new(&row.file_path)).await;
            let result = sqlx::query("DELETE FROM ops.backups WHERE id = $1")
                .bind(row.id)
                .execute(&self.ctx.pool)
                .await?;
            pruned += result.rows_affected();
        }

        if pruned > 0 {
            tracing::info!("Pruned {} scheduled backup(s), keeping {}", pruned, keep);
        }
        Ok(pruned)
    }

    /// Dump the database, archive it with the media tree, checksum the
    /// archive and record it. Does not touch the operation status.
    pub(crate) async fn create_archive(
        &self,
        operation_id: Uuid,
        trigger: BackupTrigger,
        progress: &ScopedProgress,
    ) -> Result<Backup, OpsError> {
        let cfg = &self.ctx.config.backup;
        let database_url = self.ctx.database_url()?;

        progress.report(0, "preparing").await;
        let work = WorkDir::create(&cfg.work_dir, operation_id).await?;
        tokio::fs::create_dir_all(&cfg.backup_dir).await?;

        progress.report(10, "dumping database").await;
        let dump = work.join(DUMP_FILE);
        process::run(&cfg.pg_dump_bin, pg_dump_args(database_url, &dump)).await?;

        let media = if cfg.include_media {
            media_location(&self.ctx.media_root()).await?
        } else {
            None
        };

        let manifest = ArchiveManifest {
            format: ARCHIVE_FORMAT,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            media_dir: media.as_ref().map(|(_, name)| name.to_string_lossy().into_owned()),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|e| OpsError::Rejected(e.to_string()))?;
        tokio::fs::write(work.join(MANIFEST_FILE), manifest_json).await?;

        progress.report(50, "archiving").await;
        let file_name = archive_file_name(manifest.created_at, operation_id);
        let archive = cfg.backup_dir.join(&file_name);

        let mut args: Vec<OsString> = vec![
            "-czf".into(),
            archive.clone().into(),
            "-C".into(),
            work.path().into(),
            DUMP_FILE.into(),
            MANIFEST_FILE.into(),
        ];
        if let Some((parent, name)) = &media {
            args.extend(["-C".into(), parent.clone().into(), name.clone()]);
        }

        if let Err(e) = process::run(&cfg.tar_bin, &args).await {
            remove_archive(&archive).await;
            return Err(e);
        }
        work.remove().await;

        progress.report(85, "computing checksum").await;
        let stored = self
            .record(operation_id, &file_name, &archive, media.is_some(), trigger)
            .await;
        if stored.is_err() {
            remove_archive(&archive).await;
        }
        let backup = stored?;

        progress.report(100, "backup stored").await;
        tracing::info!(
            backup_id = %backup.id,
            size_bytes = backup.size_bytes,
            trigger = %trigger,
            "Created backup {}",
            backup.file_name
        );
        Ok(backup)
    }

    async fn record(
        &self,
        operation_id: Uuid,
        file_name: &str,
        archive: &Path,
        includes_media: bool,
        trigger: BackupTrigger,
    ) -> Result<Backup, OpsError> {
        let (checksum, size) = sha256_file(archive).await?;
        let sql = format!(
            r#"
            INSERT INTO ops.backups (operation_id, file_name, file_path, size_bytes, checksum, includes_media, trigger)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            COLUMNS
        );
        let row: BackupRow = sqlx::query_as(&sql)
            .bind(operation_id)
            .bind(file_name)
            .bind(archive.to_string_lossy().as_ref())
            .bind(size as i64)
            .bind(&checksum)
            .bind(includes_media)
            .bind(trigger.as_str())
            .fetch_one(&self.ctx.pool)
            .await?;
        Ok(row.try_into()?)
    }

    /// Verify, then load the dump and swap in the archived media. Nothing is
    /// touched when the checksum does not match.
    pub(crate) async fn restore_archive(
        &self,
        backup: &Backup,
        operation_id: Uuid,
        progress: &ScopedProgress,
    ) -> Result<(), OpsError> {
        let cfg = &self.ctx.config.backup;
        let database_url = self.ctx.database_url()?;
        let archive = PathBuf::from(&backup.file_path);

        progress.report(0, "verifying checksum").await;
        if !tokio::fs::try_exists(&archive).await? {
            return Err(OpsError::NotFound("Backup archive"));
        }
        let (actual, _) = sha256_file(&archive).await?;
        if !digests_match(&backup.checksum, &actual) {
            return Err(OpsError::ChecksumMismatch {
                expected: backup.checksum.clone(),
                actual,
            });
        }

        progress.report(20, "extracting").await;
        let work = WorkDir::create(&cfg.work_dir, operation_id).await?;
        let args: Vec<OsString> = vec![
            "-xzf".into(),
            archive.clone().into(),
            "-C".into(),
            work.path().into(),
            DUMP_FILE.into(),
            MANIFEST_FILE.into(),
        ];
        process::run(&cfg.tar_bin, &args).await?;

        let raw = tokio::fs::read(work.join(MANIFEST_FILE)).await?;
        let manifest: ArchiveManifest = serde_json::from_slice(&raw)
            .map_err(|e| OpsError::Rejected(format!("backup manifest unreadable: {}", e)))?;
        if manifest.format != ARCHIVE_FORMAT {
            return Err(OpsError::Rejected(format!(
                "unsupported backup format {}",
                manifest.format
            )));
        }

        progress.report(40, "restoring database").await;
        let dump = work.join(DUMP_FILE);
        process::run(&cfg.psql_bin, psql_restore_args(database_url, &dump)).await?;

        work.remove().await;

        if let Some(media_dir) = &manifest.media_dir {
            progress.report(80, "restoring media").await;
            self.replace_media(&archive, media_dir, operation_id).await?;
        }

        if let Some(resolver) = &self.ctx.resolver {
            resolver.clear().await;
        }

        progress.report(100, "restore finished").await;
        tracing::info!(backup_id = %backup.id, "Restored backup {}", backup.file_name);
        Ok(())
    }

    /// Move the live media tree aside, extract the archived one in its place,
    /// and put the old tree back if extraction fails.
    async fn replace_media(&self, archive: &Path, media_dir: &str, operation_id: Uuid) -> Result<(), OpsError> {
        let root = self.ctx.media_root();
        tokio::fs::create_dir_all(&root).await?;
        let Some((parent, name)) = media_location(&root).await? else {
            return Err(OpsError::Rejected("media root has no parent directory".to_string()));
        };
        if name.to_string_lossy() != media_dir {
            return Err(OpsError::Rejected(format!(
                "archived media directory '{}' does not match storage root '{}'",
                media_dir,
                name.to_string_lossy()
            )));
        }

        let live = parent.join(&name);
        let aside = parent.join(format!("{}.pre-restore-{}", media_dir, operation_id));
        tokio::fs::rename(&live, &aside).await?;

        let args: Vec<OsString> = vec![
            "-xzf".into(),
            archive.into(),
            "-C".into(),
            parent.clone().into(),
            name.clone(),
        ];
        match process::run(&self.ctx.config.backup.tar_bin, &args).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_dir_all(&aside).await {
                    tracing::warn!("Could not remove previous media tree {}: {}", aside.display(), e);
                }
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&live).await;
                tokio::fs::rename(&aside, &live).await?;
                Err(e)
            }
        }
    }
}

fn pg_dump_args(database_url: &str, dump: &Path) -> Vec<OsString> {
    vec![
        "--clean".into(),
        "--if-exists".into(),
        "--no-owner".into(),
        "--format=plain".into(),
        format!("--schema={}", DUMP_SCHEMA).into(),
        "--file".into(),
        dump.into(),
        "--dbname".into(),
        database_url.into(),
    ]
}

/// Replay a dump into an empty schema. `--clean` only drops objects that
/// existed when the dump was taken, so anything created since (tables from a
/// later migration) is removed by recreating the schema in the same
/// transaction.
fn psql_restore_args(database_url: &str, dump: &Path) -> Vec<OsString> {
    vec![
        "--dbname".into(),
        database_url.into(),
        "--single-transaction".into(),
        "--quiet".into(),
        "-v".into(),
        "ON_ERROR_STOP=1".into(),
        "--command".into(),
        format!("DROP SCHEMA IF EXISTS {} CASCADE", DUMP_SCHEMA).into(),
        "--command".into(),
        format!("CREATE SCHEMA {}", DUMP_SCHEMA).into(),
        "--file".into(),
        dump.into(),
    ]
}

/// Absolute parent directory and final component of the media root, or
/// `None` when there is nothing to archive yet.
async fn media_location(root: &Path) -> Result<Option<(PathBuf, OsString)>, OpsError> {
    if !tokio::fs::try_exists(root).await? {
        return Ok(None);
    }
    let absolute = tokio::fs::canonicalize(root).await?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok(Some((parent.to_path_buf(), name.to_os_string()))),
        _ => Ok(None),
    }
}

fn archive_file_name(at: DateTime<Utc>, operation_id: Uuid) -> String {
    let id = operation_id.simple().to_string();
    format!("backup-{}-{}.tar.gz", at.format("%Y%m%d-%H%M%S"), &id[..8])
}

async fn remove_archive(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove backup archive {}: {}", path.display(), e);
        } else {
            tracing::warn!("Backup archive {} was already gone", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn archive_names_sort_by_time() {
        let id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 4, 5, 6).unwrap();
        assert_eq!(archive_file_name(at, id), "backup-20260301-040506-0f8fad5b.tar.gz");
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn dump_covers_public_schema_only() {
        let args = strings(pg_dump_args("postgres://cms@db/cms", Path::new("/tmp/x/database.sql")));
        assert!(args.contains(&"--clean".to_string()));
        assert!(args.contains(&"--if-exists".to_string()));
        assert!(args.contains(&"--no-owner".to_string()));
        assert!(args.contains(&"--schema=public".to_string()));
        assert!(!args.iter().any(|a| a.contains("ops")));
        assert_eq!(args.last().map(String::as_str), Some("postgres://cms@db/cms"));
    }

    #[test]
    fn restore_recreates_schema_before_the_dump() {
        let args = strings(psql_restore_args("postgres://cms@db/cms", Path::new("/tmp/x/database.sql")));
        let position = |needle: &str| args.iter().position(|a| a == needle).unwrap();

        assert!(args.contains(&"--single-transaction".to_string()));
        assert!(args.contains(&"ON_ERROR_STOP=1".to_string()));
        let drop = position("DROP SCHEMA IF EXISTS public CASCADE");
        let create = position("CREATE SCHEMA public");
        let dump = position("/tmp/x/database.sql");
        assert!(drop < create && create < dump);
    }

    #[test]
    fn triggers_round_trip() {
        for t in [BackupTrigger::Manual, BackupTrigger::Scheduled, BackupTrigger::PreUpdate] {
            assert_eq!(t.as_str().parse::<BackupTrigger>().unwrap(), t);
        }
        assert!("nightly".parse::<BackupTrigger>().is_err());
    }

    #[tokio::test]
    async fn missing_media_root_is_skipped() {
        let root = std::env::temp_dir().join(format!("cms-no-media-{}", Uuid::new_v4()));
        assert!(media_location(&root).await.unwrap().is_none());

        tokio::fs::create_dir_all(&root).await.unwrap();
        let (parent, name) = media_location(&root).await.unwrap().unwrap();
        assert!(parent.is_absolute());
        assert_eq!(name, root.file_name().unwrap());
        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
