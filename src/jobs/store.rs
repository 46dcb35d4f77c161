use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::state::{JobKind, JobStatus};
use super::JobError;
use crate::database::{DatabaseError, Paginated, Pagination};

/// Persisted operation record
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: i16,
    pub stage: Option<String>,
    pub error: Option<String>,
    pub requested_by: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OperationRow {
    id: Uuid,
    kind: String,
    status: String,
    progress: i16,
    stage: Option<String>,
    error: Option<String>,
    requested_by: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OperationRow> for Operation {
    type Error = DatabaseError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        Ok(Operation {
            id: row.id,
            kind: row.kind.parse().map_err(DatabaseError::Invalid)?,
            status: row.status.parse().map_err(DatabaseError::Invalid)?,
            progress: row.progress,
            stage: row.stage,
            error: row.error,
            requested_by: row.requested_by,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str =
    "id, kind, status, progress, stage, error, requested_by, started_at, finished_at, created_at, updated_at";

/// Database access for the `operations` table. Every status change goes
/// through [`OperationStore::transition`].
#[derive(Clone)]
pub struct OperationStore {
    pool: PgPool,
}

impl OperationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending operation. The id is chosen by the caller so the
    /// registry slot can be reserved before the row exists.
    pub async fn create(&self, id: Uuid, kind: JobKind, requested_by: Option<Uuid>) -> Result<Operation, JobError> {
        let sql = format!(
            "INSERT INTO ops.operations (id, kind, status, requested_by) VALUES ($1, $2, 'pending', $3) RETURNING {}",
            COLUMNS
        );
        let row: OperationRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(kind.as_str())
            .bind(requested_by)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.try_into()?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Operation, JobError> {
        let sql = format!("SELECT {} FROM ops.operations WHERE id = $1", COLUMNS);
        let row: Option<OperationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        match row {
            Some(row) => Ok(row.try_into()?),
            None => Err(JobError::NotFound(id)),
        }
    }

    pub async fn list(&self, kind: Option<JobKind>, pagination: Pagination) -> Result<Paginated<Operation>, JobError> {
        let kind = kind.map(|k| k.as_str());
        let sql = format!(
            "SELECT {} FROM ops.operations WHERE ($1::text IS NULL OR kind = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let rows: Vec<OperationRow> = sqlx::query_as(&sql)
            .bind(kind)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ops.operations WHERE ($1::text IS NULL OR kind = $1)")
            .bind(kind)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        let items = rows
            .into_iter()
            .map(Operation::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paginated::new(items, pagination, total))
    }

    /// Compare-and-set status change. Fails with `InvalidTransition` when the
    /// edge is not part of the lifecycle and with `Conflict` when the stored
    /// status is no longer `from`.
    pub async fn transition(
        &self,
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
        error: Option<&str>,
    ) -> Result<(), JobError> {
        if !from.can_transition_to(to) {
            return Err(JobError::InvalidTransition { from, to });
        }

        let result = sqlx::query(
            r#"
            UPDATE ops.operations SET
                status = $3,
                error = COALESCE($4, error),
                progress = CASE WHEN $5 THEN 100 ELSE progress END,
                started_at = CASE WHEN $6 THEN now() ELSE started_at END,
                finished_at = CASE WHEN $7 THEN now() ELSE finished_at END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(error)
        .bind(to == JobStatus::Completed)
        .bind(to == JobStatus::Running)
        .bind(to.stamps_finish())
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 1 {
            tracing::info!(operation_id = %id, from = %from, to = %to, "operation transition");
            return Ok(());
        }

        let current = self.get(id).await?;
        Err(JobError::Conflict {
            id,
            expected: from,
            actual: current.status,
        })
    }

    pub async fn set_progress(&self, id: Uuid, progress: u8, stage: &str) -> Result<(), JobError> {
        sqlx::query("UPDATE ops.operations SET progress = $2, stage = $3, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(progress.min(100) as i16)
            .bind(stage)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    /// Close operations left open by a previous process. Returns how many rows
    /// were closed.
    pub async fn recover_interrupted(&self) -> Result<u64, JobError> {
        let mut closed = 0;
        for status in JobStatus::OPEN {
            let Some(next) = status.interrupted() else { continue };
            let result = sqlx::query(
                r#"
                UPDATE ops.operations SET
                    status = $2,
                    error = COALESCE(error, 'interrupted by restart'),
                    finished_at = now(),
                    updated_at = now()
                WHERE status = $1
                "#,
            )
            .bind(status.as_str())
            .bind(next.as_str())
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
            closed += result.rows_affected();
        }

        if closed > 0 {
            tracing::warn!("Closed {} operation(s) interrupted by restart", closed);
        }
        Ok(closed)
    }
}
