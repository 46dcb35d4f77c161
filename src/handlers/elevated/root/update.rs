// handlers/elevated/root/update.rs - /api/root/updates

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::{Paginated, Pagination};
use crate::jobs::Operation;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::ops::update::SystemUpdate;
use crate::ops::UpdateCheck;

/// GET /api/root/updates/check - `{current, latest, update_available}`
pub async fn update_check(State(state): State<AppState>) -> ApiResult<UpdateCheck> {
    Ok(ApiResponse::success(state.updates().check().await?))
}

/// GET /api/root/updates - Update history, newest first
pub async fn update_history(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<SystemUpdate>> {
    Ok(ApiResponse::success(state.updates().history(pagination).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartUpdate {
    #[serde(default)]
    pub version: Option<String>,
}

/**
 * POST /api/root/updates - Install the release offered by the manifest
 *
 * ```json
 * { "version": "1.4.0" }   // Optional pin; must match the manifest
 * ```
 *
 * Takes a pre-update backup, downloads and verifies the package, extracts it
 * and applies its migrations. Any failure after the backup restores it and
 * the operation ends `rolled_back` (or `rollback_failed`).
 */
pub async fn update_start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<StartUpdate>>,
) -> ApiResult<Operation> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let operation = state
        .updates()
        .start(request.version.as_deref(), Some(user.user_id))
        .await?;
    tracing::info!(operation_id = %operation.id, user_id = %user.user_id, "Update requested");
    Ok(ApiResponse::accepted(operation))
}
