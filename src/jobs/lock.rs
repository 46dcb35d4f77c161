use sqlx::{Connection, PgConnection, PgPool};

use super::JobError;
use crate::database::DatabaseError;

/// Advisory lock key for the exclusive operation slot ("cms_jobs")
pub const JOB_LOCK_KEY: i64 = 0x636d_735f_6a6f_6273;

/// Database side of the exclusive slot, so a `cms backup` run and the server
/// cannot start jobs at the same time.
///
/// A session-level advisory lock held on its own connection, detached from
/// the pool. If the process dies the connection closes and Postgres releases
/// the lock.
pub struct JobLock {
    conn: Option<PgConnection>,
}

impl std::fmt::Debug for JobLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLock").field("held", &self.conn.is_some()).finish()
    }
}

impl JobLock {
    /// `None` when another session holds the lock
    pub async fn try_acquire(pool: &PgPool) -> Result<Option<Self>, JobError> {
        let mut conn = pool.acquire().await.map_err(DatabaseError::from)?.detach();
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(JOB_LOCK_KEY)
            .fetch_one(&mut conn)
            .await
            .map_err(DatabaseError::from)?;

        if locked {
            Ok(Some(Self { conn: Some(conn) }))
        } else {
            if let Err(e) = conn.close().await {
                tracing::debug!("closing job lock probe connection: {}", e);
            }
            Ok(None)
        }
    }

    pub async fn release(mut self) {
        let Some(mut conn) = self.conn.take() else { return };
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(JOB_LOCK_KEY)
            .execute(&mut conn)
            .await
        {
            tracing::warn!("could not release job lock: {}", e);
        }
        if let Err(e) = conn.close().await {
            tracing::debug!("closing job lock connection: {}", e);
        }
    }
}
