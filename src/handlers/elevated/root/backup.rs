// handlers/elevated/root/backup.rs - /api/root/backups
//
// Backups and restores run on the job registry. Creating or restoring
// answers 202 with the operation to poll at /api/root/operations/:id; a second
// request while any backup, restore or update runs answers 409.

use axum::{
    extract::{Path, Query, State},
    Extension,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::{Paginated, Pagination};
use crate::jobs::Operation;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::ops::{Backup, BackupTrigger};

pub async fn backup_list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<Backup>> {
    Ok(ApiResponse::success(state.backups().list(pagination).await?))
}

pub async fn backup_show(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Backup> {
    Ok(ApiResponse::success(state.backups().get(id).await?))
}

/**
 * POST /api/root/backups - Start a manual backup
 *
 * Dumps the database and, when configured, archives the media tree into a
 * checksummed `.tar.gz` under `backup_dir`.
 */
pub async fn backup_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Operation> {
    let operation = state
        .backups()
        .start(BackupTrigger::Manual, Some(user.user_id))
        .await?;
    tracing::info!(operation_id = %operation.id, user_id = %user.user_id, "Backup requested");
    Ok(ApiResponse::accepted(operation))
}

/// DELETE /api/root/backups/:id - Removes the record and the archive
pub async fn backup_delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state.backups().delete(id).await?;
    Ok(ApiResponse::no_content())
}

/**
 * POST /api/root/backups/:id/restore - Restore a backup
 *
 * The archive checksum is verified before anything is touched. The dump is
 * replayed in a single transaction; media is replaced only when the archive
 * carries it.
 */
pub async fn backup_restore(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Operation> {
    let operation = state.backups().start_restore(id, Some(user.user_id)).await?;
    tracing::warn!(operation_id = %operation.id, backup_id = %id, user_id = %user.user_id, "Restore requested");
    Ok(ApiResponse::accepted(operation))
}
