pub mod backup;
pub mod checksum;
pub mod process;
pub mod update;
pub mod workdir;

use sqlx::PgPool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::DatabaseError;
use crate::jobs::{
    JobError, JobKind, JobLock, JobRegistry, JobStatus, JobTicket, Operation, OperationStore, ProgressReporter,
};
use crate::tenancy::TenantResolver;

pub use backup::{Backup, BackupService, BackupTrigger};
pub use update::{Manifest, UpdateCheck, UpdateService, Version};

/// Errors from backup, restore and update jobs
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("download failed: {0}")]
    Download(String),

    #[error("invalid update manifest: {0}")]
    Manifest(String),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Job(#[from] JobError),
}

impl From<sqlx::Error> for OpsError {
    fn from(err: sqlx::Error) -> Self {
        OpsError::Database(err.into())
    }
}

/// Shared handles every system operation needs
#[derive(Clone)]
pub struct OpsContext {
    pub pool: PgPool,
    pub store: OperationStore,
    pub registry: JobRegistry,
    pub config: Arc<AppConfig>,
    /// Cleared after a restore, since tenants and domains may have changed
    pub resolver: Option<Arc<TenantResolver>>,
}

impl OpsContext {
    pub fn new(pool: PgPool, registry: JobRegistry, config: Arc<AppConfig>) -> Self {
        Self {
            store: OperationStore::new(pool.clone()),
            pool,
            registry,
            config,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<TenantResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn database_url(&self) -> Result<&str, OpsError> {
        self.config
            .database
            .url
            .as_deref()
            .ok_or(OpsError::NotConfigured("DATABASE_URL"))
    }

    pub fn media_root(&self) -> PathBuf {
        self.config.media.storage_root.clone()
    }

    pub fn reporter(&self, operation_id: Uuid) -> ProgressReporter {
        ProgressReporter::new(operation_id, self.registry.clone(), self.store.clone())
    }

    /// Reserve the slot in this process and in the database, then persist a
    /// pending operation. Both are handed back if a later step fails.
    pub async fn begin(&self, kind: JobKind, requested_by: Option<Uuid>) -> Result<(JobTicket, Operation), OpsError> {
        let id = Uuid::new_v4();
        let ticket = self.registry.reserve(kind, id).await?;

        let lock = match JobLock::try_acquire(&self.pool).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                self.registry.finish(ticket).await;
                return Err(JobError::Busy("another process is running a system operation".to_string()).into());
            }
            Err(e) => {
                self.registry.finish(ticket).await;
                return Err(e.into());
            }
        };
        let ticket = ticket.with_lock(lock);

        match self.store.create(id, kind, requested_by).await {
            Ok(operation) => Ok((ticket, operation)),
            Err(e) => {
                self.registry.finish(ticket).await;
                Err(e.into())
            }
        }
    }

    /// Close operations left open by a dead process. Skipped while another
    /// process holds the job lock, since its open operation is still live.
    pub async fn recover_interrupted(&self) -> Result<u64, OpsError> {
        let Some(lock) = JobLock::try_acquire(&self.pool).await? else {
            tracing::info!("Job lock is held by another process; leaving open operations alone");
            return Ok(0);
        };
        let closed = self.store.recover_interrupted().await;
        lock.release().await;
        Ok(closed?)
    }

    /// Move the operation to running, await `work`, then record the outcome.
    /// The error of `work` is returned after it has been persisted.
    pub async fn drive<T, F>(&self, operation_id: Uuid, work: F) -> Result<T, OpsError>
    where
        F: Future<Output = Result<T, OpsError>>,
    {
        self.store
            .transition(operation_id, JobStatus::Pending, JobStatus::Running, None)
            .await?;

        match work.await {
            Ok(value) => {
                self.store
                    .transition(operation_id, JobStatus::Running, JobStatus::Completed, None)
                    .await?;
                Ok(value)
            }
            Err(e) => {
                tracing::error!(%operation_id, "operation failed: {}", e);
                self.fail(operation_id, &e).await;
                Err(e)
            }
        }
    }

    pub(crate) async fn fail(&self, operation_id: Uuid, error: &OpsError) {
        let message = error.to_string();
        if let Err(e) = self
            .store
            .transition(operation_id, JobStatus::Running, JobStatus::Failed, Some(&message))
            .await
        {
            tracing::error!(%operation_id, "could not record failure: {}", e);
        }
    }
}
