// handlers/elevated/root/tenant/update.rs - PATCH /api/root/tenants/:id handler

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenants::{Tenant, UpdateTenant};

/**
 * PATCH /api/root/tenants/:id - Change name, status, languages or plan
 *
 * ```json
 * { "is_active": false, "plan_id": null }
 * ```
 *
 * `plan_id: null` removes the plan; omitting it leaves the plan unchanged.
 * Deleted tenants must be restored first (409).
 */
pub async fn tenant_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTenant>,
) -> ApiResult<Tenant> {
    let tenant = state.tenants().update(id, input).await?;
    tracing::info!(tenant_id = %id, "Updated tenant {}", tenant.slug);
    Ok(ApiResponse::success(tenant))
}
