// handlers/elevated/root/tenant/delete.rs - DELETE /api/root/tenants/:id handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// Soft delete; the tenant can be brought back with restore
pub async fn tenant_delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state.tenants().delete(id).await?;
    Ok(ApiResponse::no_content())
}
