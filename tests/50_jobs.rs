mod common;

use anyhow::Result;
use std::time::Duration;
use uuid::Uuid;

use tenant_cms_api::jobs::{JobError, JobKind, JobStatus, OperationStore};
use tenant_cms_api::ops::OpsError;

#[tokio::test]
async fn stale_transition_is_a_conflict() -> Result<()> {
    let Some(db) = common::test_database().await? else { return Ok(()) };
    let store = OperationStore::new(db.pool.clone());
    let id = Uuid::new_v4();

    store.create(id, JobKind::Backup, None).await?;
    store.transition(id, JobStatus::Pending, JobStatus::Running, None).await?;

    match store.transition(id, JobStatus::Pending, JobStatus::Running, None).await {
        Err(JobError::Conflict { expected, actual, .. }) => {
            assert_eq!(expected, JobStatus::Pending);
            assert_eq!(actual, JobStatus::Running);
        }
        other => panic!("expected a conflict, got {:?}", other),
    }

    store.transition(id, JobStatus::Running, JobStatus::Completed, None).await?;
    assert_eq!(store.get(id).await?.progress, 100);
    Ok(())
}

#[tokio::test]
async fn restart_closes_open_operations() -> Result<()> {
    let Some(db) = common::test_database().await? else { return Ok(()) };
    let store = OperationStore::new(db.pool.clone());
    let (pending, running, rolling_back) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    store.create(pending, JobKind::Backup, None).await?;
    store.create(running, JobKind::Restore, None).await?;
    store.transition(running, JobStatus::Pending, JobStatus::Running, None).await?;
    store.create(rolling_back, JobKind::Update, None).await?;
    store.transition(rolling_back, JobStatus::Pending, JobStatus::Running, None).await?;
    store
        .transition(rolling_back, JobStatus::Running, JobStatus::Failed, Some("migration failed"))
        .await?;
    store
        .transition(rolling_back, JobStatus::Failed, JobStatus::RollingBack, None)
        .await?;

    let closed = db.ops().recover_interrupted().await?;
    assert!(closed >= 3);

    let op = store.get(pending).await?;
    assert_eq!(op.status, JobStatus::Failed);
    assert_eq!(op.error.as_deref(), Some("interrupted by restart"));
    assert!(op.finished_at.is_some());

    assert_eq!(store.get(running).await?.status, JobStatus::Failed);

    let op = store.get(rolling_back).await?;
    assert_eq!(op.status, JobStatus::RollbackFailed);
    assert_eq!(op.error.as_deref(), Some("migration failed"));
    Ok(())
}

#[tokio::test]
async fn job_slot_is_exclusive_across_processes() -> Result<()> {
    let Some(db) = common::test_database().await? else { return Ok(()) };
    let server = db.ops();
    let cli = db.ops();

    let (ticket, operation) = server.begin(JobKind::Update, None).await?;

    let second = cli.begin(JobKind::Restore, None).await;
    assert!(matches!(second, Err(OpsError::Job(JobError::Busy(_)))));
    assert!(cli.registry.is_idle().await);

    // Startup in the other process must not close the live operation
    assert_eq!(cli.recover_interrupted().await?, 0);
    assert_eq!(server.store.get(operation.id).await?.status, JobStatus::Pending);

    server.registry.finish(ticket).await;
    let (ticket, _) = cli.begin(JobKind::Restore, None).await?;
    cli.registry.finish(ticket).await;

    server.recover_interrupted().await?;
    assert_eq!(server.store.get(operation.id).await?.status, JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn panicking_job_is_closed_as_failed() -> Result<()> {
    let Some(db) = common::test_database().await? else { return Ok(()) };
    let ops = db.ops();
    let (ticket, operation) = ops.begin(JobKind::Backup, None).await?;
    ops.store
        .transition(operation.id, JobStatus::Pending, JobStatus::Running, None)
        .await?;

    ops.registry.spawn(ticket, ops.store.clone(), async {
        panic!("tar crashed");
    });

    let wait = async {
        while !ops.registry.is_idle().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait).await?;

    let closed = ops.store.get(operation.id).await?;
    assert_eq!(closed.status, JobStatus::Failed);
    assert_eq!(closed.error.as_deref(), Some("operation task aborted"));

    // Slot and database lock are both free again
    let next = db.ops();
    let (ticket, _) = next.begin(JobKind::Backup, None).await?;
    next.registry.finish(ticket).await;
    next.recover_interrupted().await?;
    Ok(())
}
