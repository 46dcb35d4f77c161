// handlers/elevated/root/plan.rs - /api/root/plans, PUT /api/root/tenants/:id/plan

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::billing::{BillingService, Plan, PlanInput};
use crate::services::tenants::Tenant;

pub async fn plan_list(State(state): State<AppState>) -> ApiResult<Vec<Plan>> {
    Ok(ApiResponse::success(BillingService::new(state.pool.clone()).list_plans().await?))
}

pub async fn plan_show(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Plan> {
    Ok(ApiResponse::success(BillingService::new(state.pool.clone()).get_plan(id).await?))
}

/**
 * POST /api/root/plans - Create a plan
 *
 * ```json
 * {
 *   "code": "starter",
 *   "name": "Starter",
 *   "price_cents": 900,
 *   "max_pages": 20,
 *   "max_team_members": 5,
 *   "max_media_bytes": 104857600,
 *   "max_domains": 1
 * }
 * ```
 *
 * A missing limit means unlimited.
 */
pub async fn plan_create(State(state): State<AppState>, Json(input): Json<PlanInput>) -> ApiResult<Plan> {
    let plan = BillingService::new(state.pool.clone()).create_plan(input).await?;
    tracing::info!(plan_id = %plan.id, "Created plan {}", plan.code);
    Ok(ApiResponse::created(plan))
}

/// PUT /api/root/plans/:id - Full replacement
pub async fn plan_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<PlanInput>,
) -> ApiResult<Plan> {
    Ok(ApiResponse::success(BillingService::new(state.pool.clone()).update_plan(id, input).await?))
}

/// DELETE /api/root/plans/:id - 409 while tenants are on the plan
pub async fn plan_delete(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    BillingService::new(state.pool.clone()).delete_plan(id).await?;
    Ok(ApiResponse::no_content())
}

#[derive(Debug, Deserialize)]
pub struct AssignPlan {
    pub plan_id: Option<Uuid>,
}

/// PUT /api/root/tenants/:id/plan - `{ "plan_id": "uuid" }`, null removes it
pub async fn plan_assign(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(input): Json<AssignPlan>,
) -> ApiResult<Tenant> {
    BillingService::new(state.pool.clone())
        .assign_plan(tenant_id, input.plan_id)
        .await?;
    state.resolver.invalidate_tenant(tenant_id).await;
    Ok(ApiResponse::success(state.tenants().get(tenant_id).await?))
}
