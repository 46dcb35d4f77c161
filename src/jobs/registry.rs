use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::lock::JobLock;
use super::state::JobKind;
use super::store::OperationStore;
use super::JobError;

/// Live view of a running operation
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub operation_id: Uuid,
    pub kind: JobKind,
    pub progress: u8,
    pub stage: String,
    pub started_at: DateTime<Utc>,
}

/// In-process registry of running system operations.
///
/// Backups, restores and updates all touch the database dump and the media
/// tree, so only one of them may run at a time.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobSnapshot>>>,
}

/// Proof that the slot was reserved. A caller that fails before
/// [`JobRegistry::spawn`] must hand it back with [`JobRegistry::finish`].
#[derive(Debug)]
pub struct JobTicket {
    pub operation_id: Uuid,
    pub kind: JobKind,
    lock: Option<JobLock>,
}

impl JobTicket {
    /// Attach the database lock guarding the slot across processes
    pub fn with_lock(mut self, lock: JobLock) -> Self {
        self.lock = Some(lock);
        self
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the exclusive slot for `operation_id`
    pub async fn reserve(&self, kind: JobKind, operation_id: Uuid) -> Result<JobTicket, JobError> {
        let mut jobs = self.jobs.write().await;
        if let Some(running) = jobs.values().next() {
            return Err(JobError::Busy(format!(
                "{} operation {} is already running",
                running.kind, running.operation_id
            )));
        }
        jobs.insert(
            operation_id,
            JobSnapshot {
                operation_id,
                kind,
                progress: 0,
                stage: "queued".to_string(),
                started_at: Utc::now(),
            },
        );
        Ok(JobTicket {
            operation_id,
            kind,
            lock: None,
        })
    }

    pub async fn release(&self, operation_id: Uuid) {
        self.jobs.write().await.remove(&operation_id);
    }

    /// Release the database lock, then the in-process slot
    pub async fn finish(&self, mut ticket: JobTicket) {
        if let Some(lock) = ticket.lock.take() {
            lock.release().await;
        }
        self.release(ticket.operation_id).await;
    }

    pub async fn update(&self, operation_id: Uuid, progress: u8, stage: &str) {
        if let Some(job) = self.jobs.write().await.get_mut(&operation_id) {
            job.progress = progress.min(100);
            job.stage = stage.to_string();
        }
    }

    pub async fn snapshot(&self, operation_id: Uuid) -> Option<JobSnapshot> {
        self.jobs.read().await.get(&operation_id).cloned()
    }

    pub async fn running(&self) -> Vec<JobSnapshot> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn is_idle(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Run `job` on the runtime under supervision. The job drives its own
    /// status transitions; the supervisor only steps in when the task panics
    /// or is cancelled, closing the operation as failed. The slot is released
    /// in every case.
    pub fn spawn<F>(&self, ticket: JobTicket, store: OperationStore, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = self.clone();
        let (operation_id, kind) = (ticket.operation_id, ticket.kind);
        let handle = tokio::spawn(job);

        tokio::spawn(async move {
            if let Err(join_error) = handle.await {
                tracing::error!(%operation_id, %kind, "operation task aborted: {}", join_error);
                if let Err(e) = close_aborted(&store, operation_id).await {
                    tracing::error!(%operation_id, "could not close aborted operation: {}", e);
                }
            }
            registry.finish(ticket).await;
        });
    }
}

async fn close_aborted(store: &OperationStore, operation_id: Uuid) -> Result<(), JobError> {
    let operation = store.get(operation_id).await?;
    match operation.status.interrupted() {
        Some(next) => {
            store
                .transition(operation_id, operation.status, next, Some("operation task aborted"))
                .await
        }
        // Already closed by the job itself before it went down
        None => Ok(()),
    }
}

/// Reports progress to the registry and the operations table
#[derive(Clone)]
pub struct ProgressReporter {
    operation_id: Uuid,
    registry: JobRegistry,
    store: OperationStore,
}

impl ProgressReporter {
    pub fn new(operation_id: Uuid, registry: JobRegistry, store: OperationStore) -> Self {
        Self {
            operation_id,
            registry,
            store,
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub async fn report(&self, progress: u8, stage: &str) {
        tracing::info!(operation_id = %self.operation_id, progress, stage, "operation progress");
        self.registry.update(self.operation_id, progress, stage).await;
        // Progress is advisory; a failed write must not fail the job.
        if let Err(e) = self.store.set_progress(self.operation_id, progress, stage).await {
            tracing::warn!(operation_id = %self.operation_id, "could not persist progress: {}", e);
        }
    }

    /// A sub-range view, so nested steps (the backup inside an update) can
    /// report 0..=100 and land inside the parent's window.
    pub fn scoped(&self, start: u8, end: u8) -> ScopedProgress {
        ScopedProgress {
            inner: self.clone(),
            start,
            end: end.max(start),
        }
    }
}

#[derive(Clone)]
pub struct ScopedProgress {
    inner: ProgressReporter,
    start: u8,
    end: u8,
}

impl ScopedProgress {
    pub fn map(&self, progress: u8) -> u8 {
        let span = (self.end - self.start) as u16;
        self.start + ((span * progress.min(100) as u16) / 100) as u8
    }

    pub async fn report(&self, progress: u8, stage: &str) {
        self.inner.report(self.map(progress), stage).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_operation_at_a_time() {
        let registry = JobRegistry::new();
        let first = Uuid::new_v4();
        registry.reserve(JobKind::Backup, first).await.unwrap();

        let second = registry.reserve(JobKind::Update, Uuid::new_v4()).await;
        assert!(matches!(second, Err(JobError::Busy(_))));

        registry.release(first).await;
        assert!(registry.is_idle().await);
        assert!(registry.reserve(JobKind::Restore, Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn progress_updates_are_visible_and_clamped() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        registry.reserve(JobKind::Backup, id).await.unwrap();

        registry.update(id, 40, "dumping database").await;
        let snap = registry.snapshot(id).await.unwrap();
        assert_eq!(snap.progress, 40);
        assert_eq!(snap.stage, "dumping database");

        registry.update(id, 250, "done").await;
        assert_eq!(registry.snapshot(id).await.unwrap().progress, 100);
        assert_eq!(registry.running().await.len(), 1);
    }

    #[tokio::test]
    async fn updating_unknown_operation_is_a_no_op() {
        let registry = JobRegistry::new();
        registry.update(Uuid::new_v4(), 10, "ghost").await;
        assert!(registry.is_idle().await);
    }

    /// Nothing listens on port 1, so store writes fail quickly
    fn unreachable_store() -> OperationStore {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://cms@127.0.0.1:1/none")
            .unwrap();
        OperationStore::new(pool)
    }

    async fn wait_idle(registry: &JobRegistry) -> bool {
        let wait = async {
            while !registry.is_idle().await {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(10), wait).await.is_ok()
    }

    #[tokio::test]
    async fn panicking_job_frees_the_slot() {
        let registry = JobRegistry::new();
        let ticket = registry.reserve(JobKind::Backup, Uuid::new_v4()).await.unwrap();

        registry.spawn(ticket, unreachable_store(), async {
            panic!("pg_dump went away");
        });

        assert!(wait_idle(&registry).await);
        assert!(registry.reserve(JobKind::Update, Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn finished_job_frees_the_slot() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        let ticket = registry.reserve(JobKind::Restore, id).await.unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        registry.spawn(ticket, unreachable_store(), async move {
            let _ = rx.await;
        });
        assert!(registry.snapshot(id).await.is_some());

        tx.send(()).unwrap();
        assert!(wait_idle(&registry).await);
    }

    #[tokio::test]
    async fn scoped_progress_maps_into_window() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/none")
            .unwrap();
        let reporter = ProgressReporter::new(Uuid::new_v4(), JobRegistry::new(), OperationStore::new(pool));
        let scoped = reporter.scoped(10, 30);
        assert_eq!(scoped.map(0), 10);
        assert_eq!(scoped.map(50), 20);
        assert_eq!(scoped.map(100), 30);
        assert_eq!(scoped.map(200), 30);
    }
}
