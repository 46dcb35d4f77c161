// handlers/protected/tenant.rs - GET/PUT /api/tenant (own tenant)

use axum::{extract::State, Extension, Json};

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::tenants::{Tenant, UpdateOwnTenant};
use crate::tenancy::TenantContext;

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Tenant> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(state.tenants().get(tenant.id).await?))
}

/// PUT /api/tenant - Name and languages only; plan and status are operator data
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<UpdateOwnTenant>,
) -> ApiResult<Tenant> {
    user.require(Role::Admin)?;
    let updated = state.tenants().update(tenant.id, input.into()).await?;
    tracing::info!(tenant = %updated.slug, "Tenant settings updated");
    Ok(ApiResponse::success(updated))
}
