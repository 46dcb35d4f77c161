// handlers/elevated/root/tenant/restore.rs - POST /api/root/tenants/:id/restore handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenants::Tenant;

/// Undo a soft delete. 409 when the tenant is not deleted.
pub async fn tenant_restore(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Tenant> {
    let tenant = state.tenants().restore(id).await?;
    tracing::info!(tenant_id = %id, "Restored tenant {}", tenant.slug);
    Ok(ApiResponse::success(tenant))
}
