use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::backup::{Backup, BackupService, BackupTrigger};
use super::checksum::digests_match;
use super::{process, OpsContext, OpsError};
use crate::database::{DatabaseManager, Paginated, Pagination};
use crate::jobs::{JobKind, JobStatus, Operation, ProgressReporter, ScopedProgress};
use crate::services::settings::SettingsRepository;

/// `major.minor.patch`, compared numerically. A leading `v` and any
/// pre-release or build suffix are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let core = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = core.split(['-', '+']).next().unwrap_or_default();

        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(format!("'{}' is not a version", s));
        }
        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| format!("'{}' is not a version", s))?;
        }
        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Release manifest served at `updates.manifest_url`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub url: String,
    pub sha256: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Manifest {
    pub fn validate(&self) -> Result<Version, OpsError> {
        let version: Version = self.version.parse().map_err(OpsError::Manifest)?;
        match url::Url::parse(&self.url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return Err(OpsError::Manifest(format!("package url '{}' is not http(s)", self.url))),
        }
        let sha = self.sha256.trim();
        if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(OpsError::Manifest("sha256 must be 64 hex characters".to_string()));
        }
        Ok(version)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheck {
    pub current: String,
    pub latest: String,
    pub update_available: bool,
    pub notes: Option<String>,
}

impl UpdateCheck {
    pub fn compare(current: &str, manifest: &Manifest) -> Result<Self, OpsError> {
        let latest = manifest.validate()?;
        let installed: Version = current.parse().map_err(OpsError::Rejected)?;
        Ok(UpdateCheck {
            current: current.to_string(),
            latest: manifest.version.clone(),
            update_available: latest > installed,
            notes: manifest.notes.clone(),
        })
    }
}

/// One row of update history with the state of its operation
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SystemUpdate {
    pub id: Uuid,
    pub operation_id: Uuid,
    pub from_version: String,
    pub to_version: String,
    pub package_url: String,
    pub package_checksum: String,
    pub backup_id: Option<Uuid>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Self-update: back up, download, verify, extract, migrate. Rolls back
/// to the pre-update backup when any step after the backup fails.
#[derive(Clone)]
pub struct UpdateService {
    ctx: OpsContext,
    backups: BackupService,
    http: reqwest::Client,
}

impl UpdateService {
    pub fn new(ctx: OpsContext, http: reqwest::Client) -> Self {
        Self {
            backups: BackupService::new(ctx.clone()),
            ctx,
            http,
        }
    }

    /// Installed version: the last applied update, else the build version
    pub async fn current_version(&self) -> Result<String, OpsError> {
        Ok(SettingsRepository::installed_version(&self.ctx.pool)
            .await?
            .unwrap_or_else(|| self.ctx.config.updates.current_version.clone()))
    }

    pub async fn fetch_manifest(&self) -> Result<Manifest, OpsError> {
        let url = self
            .ctx
            .config
            .updates
            .manifest_url
            .as_deref()
            .ok_or(OpsError::NotConfigured("update manifest URL"))?;

        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OpsError::Download(e.to_string()))?;

        response
            .json::<Manifest>()
            .await
            .map_err(|e| OpsError::Manifest(e.to_string()))
    }

    pub async fn check(&self) -> Result<UpdateCheck, OpsError> {
        let manifest = self.fetch_manifest().await?;
        let current = self.current_version().await?;
        UpdateCheck::compare(&current, &manifest)
    }

    pub async fn history(&self, pagination: Pagination) -> Result<Paginated<SystemUpdate>, OpsError> {
        let rows: Vec<SystemUpdate> = sqlx::query_as(
            r#"
            SELECT u.id, u.operation_id, u.from_version, u.to_version, u.package_url, u.package_checksum,
                   u.backup_id, o.status, o.error, u.created_at, o.finished_at
            FROM ops.system_updates u
            JOIN ops.operations o ON o.id = u.operation_id
            ORDER BY u.created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.ctx.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ops.system_updates")
            .fetch_one(&self.ctx.pool)
            .await?;
        Ok(Paginated::new(rows, pagination, total))
    }

    /// Validate the request against the manifest, then queue the update.
    /// `requested` pins a version; it must be the one the manifest offers.
    pub async fn start(&self, requested: Option<&str>, requested_by: Option<Uuid>) -> Result<Operation, OpsError> {
        let manifest = self.fetch_manifest().await?;
        let target = manifest.validate()?;

        if let Some(requested) = requested {
            let requested: Version = requested.parse().map_err(OpsError::Rejected)?;
            if requested != target {
                return Err(OpsError::Rejected(format!(
                    "version {} is not available; the latest release is {}",
                    requested, target
                )));
            }
        }

        let current = self.current_version().await?;
        let installed: Version = current.parse().map_err(OpsError::Rejected)?;
        if target <= installed {
            return Err(OpsError::Rejected(format!("already running {} (offered {})", current, target)));
        }

        let (ticket, operation) = self.ctx.begin(JobKind::Update, requested_by).await?;
        let service = self.clone();
        let operation_id = operation.id;
        self.ctx.registry.spawn(ticket, self.ctx.store.clone(), async move {
            let _ = service.execute(operation_id, manifest, current).await;
        });

        Ok(operation)
    }

    async fn execute(&self, operation_id: Uuid, manifest: Manifest, from_version: String) -> Result<(), OpsError> {
        let store = &self.ctx.store;
        let reporter = self.ctx.reporter(operation_id);
        store
            .transition(operation_id, JobStatus::Pending, JobStatus::Running, None)
            .await?;

        let backup = match self
            .backups
            .create_archive(operation_id, BackupTrigger::PreUpdate, &reporter.scoped(0, 30))
            .await
        {
            Ok(backup) => backup,
            Err(e) => {
                tracing::error!(%operation_id, "pre-update backup failed: {}", e);
                self.ctx.fail(operation_id, &e).await;
                return Err(e);
            }
        };

        let applied = async {
            self.record(operation_id, &manifest, &from_version, backup.id).await?;
            self.apply(&manifest, &reporter.scoped(30, 100)).await
        }
        .await;

        match applied {
            Ok(()) => {
                store
                    .transition(operation_id, JobStatus::Running, JobStatus::Completed, None)
                    .await?;
                tracing::info!(%operation_id, "Updated {} -> {}", from_version, manifest.version);
                Ok(())
            }
            Err(e) => {
                tracing::error!(%operation_id, "update to {} failed: {}", manifest.version, e);
                self.ctx.fail(operation_id, &e).await;
                self.roll_back(operation_id, &backup, &reporter).await;
                Err(e)
            }
        }
    }

    async fn record(&self, operation_id: Uuid, manifest: &Manifest, from_version: &str, backup_id: Uuid) -> Result<(), OpsError> {
        sqlx::query(
            r#"
            INSERT INTO ops.system_updates (operation_id, from_version, to_version, package_url, package_checksum, backup_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(operation_id)
        .bind(from_version)
        .bind(&manifest.version)
        .bind(&manifest.url)
        .bind(manifest.sha256.trim().to_ascii_lowercase())
        .bind(backup_id)
        .execute(&self.ctx.pool)
        .await?;
        Ok(())
    }

    async fn apply(&self, manifest: &Manifest, progress: &ScopedProgress) -> Result<(), OpsError> {
        let releases = &self.ctx.config.updates.releases_dir;
        let version = manifest.validate()?.to_string();
        tokio::fs::create_dir_all(releases).await?;

        progress.report(0, "downloading package").await;
        let package = releases.join(format!("cms-{}.tar.gz", version));
        let actual = self.download(&manifest.url, &package, progress).await?;

        progress.report(40, "verifying package").await;
        if !digests_match(&manifest.sha256, &actual) {
            let _ = tokio::fs::remove_file(&package).await;
            return Err(OpsError::ChecksumMismatch {
                expected: manifest.sha256.trim().to_ascii_lowercase(),
                actual,
            });
        }

        progress.report(50, "extracting package").await;
        let target = releases.join(&version);
        if tokio::fs::try_exists(&target).await? {
            tokio::fs::remove_dir_all(&target).await?;
        }
        tokio::fs::create_dir_all(&target).await?;
        let args: Vec<OsString> = vec!["-xzf".into(), package.into(), "-C".into(), target.clone().into()];
        process::run(&self.ctx.config.backup.tar_bin, &args).await?;

        let migrations = target.join("migrations");
        if tokio::fs::try_exists(&migrations).await? {
            progress.report(70, "applying migrations").await;
            DatabaseManager::migrate_from_dir(&self.ctx.pool, &migrations).await?;
        }

        progress.report(90, "recording version").await;
        SettingsRepository::set_installed_version(&self.ctx.pool, &version).await?;

        progress.report(100, "update applied").await;
        Ok(())
    }

    /// Stream the package to disk, hashing as it arrives. Download progress
    /// fills the first 40% of `progress`.
    async fn download(&self, url: &str, dest: &Path, progress: &ScopedProgress) -> Result<String, OpsError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OpsError::Download(e.to_string()))?;

        let total = response.content_length().filter(|len| *len > 0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        let mut reported = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| OpsError::Download(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (received * 100 / total).min(100);
                if percent >= reported + 10 {
                    reported = percent;
                    progress.report((percent * 40 / 100) as u8, "downloading package").await;
                }
            }
        }
        file.flush().await?;

        tracing::info!("Downloaded {} ({} bytes)", url, received);
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn roll_back(&self, operation_id: Uuid, backup: &Backup, reporter: &ProgressReporter) {
        let store = &self.ctx.store;
        if let Err(e) = store
            .transition(operation_id, JobStatus::Failed, JobStatus::RollingBack, None)
            .await
        {
            tracing::error!(%operation_id, "could not start rollback: {}", e);
            return;
        }

        let outcome = self
            .backups
            .restore_archive(backup, operation_id, &reporter.scoped(0, 100))
            .await;

        let result = match outcome {
            Ok(()) => {
                tracing::warn!(%operation_id, "Rolled back to backup {}", backup.file_name);
                store
                    .transition(operation_id, JobStatus::RollingBack, JobStatus::RolledBack, None)
                    .await
            }
            Err(e) => {
                tracing::error!(%operation_id, "rollback failed: {}", e);
                let message = format!("rollback failed: {}", e);
                store
                    .transition(operation_id, JobStatus::RollingBack, JobStatus::RollbackFailed, Some(&message))
                    .await
            }
        };
        if let Err(e) = result {
            tracing::error!(%operation_id, "could not record rollback outcome: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(version: &str) -> Manifest {
        Manifest {
            version: version.to_string(),
            url: "https://releases.example.com/cms-1.4.0.tar.gz".to_string(),
            sha256: "a".repeat(64),
            notes: Some("bug fixes".to_string()),
        }
    }

    #[test]
    fn versions_compare_numerically() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert_eq!(v("v1.2.3"), v("1.2.3"));
        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("1.2.3-rc.1"), v("1.2.3"));
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert!("1.x".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn manifest_validation() {
        assert!(manifest("1.4.0").validate().is_ok());

        let mut bad = manifest("1.4.0");
        bad.sha256 = "abc".to_string();
        assert!(matches!(bad.validate(), Err(OpsError::Manifest(_))));

        let mut bad = manifest("1.4.0");
        bad.url = "file:///etc/passwd".to_string();
        assert!(matches!(bad.validate(), Err(OpsError::Manifest(_))));

        assert!(matches!(manifest("latest").validate(), Err(OpsError::Manifest(_))));
    }

    #[test]
    fn check_reports_availability() {
        let check = UpdateCheck::compare("1.3.9", &manifest("1.4.0")).unwrap();
        assert!(check.update_available);
        assert_eq!(check.latest, "1.4.0");

        let check = UpdateCheck::compare("1.4.0", &manifest("1.4.0")).unwrap();
        assert!(!check.update_available);

        let check = UpdateCheck::compare("2.0.0", &manifest("1.4.0")).unwrap();
        assert!(!check.update_available);
    }

    #[test]
    fn manifest_notes_are_optional() {
        let raw = r#"{"version":"1.0.1","url":"https://x.test/p.tgz","sha256":"00"}"#;
        let parsed: Manifest = serde_json::from_str(raw).unwrap();
        assert!(parsed.notes.is_none());
    }
}
