// handlers/protected/billing.rs - GET /api/billing

use axum::{extract::State, Extension};

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::billing::{BillingOverview, BillingService};
use crate::tenancy::TenantContext;

/// Current plan, usage and remaining allowance per limit
pub async fn overview(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<BillingOverview> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(BillingService::new(state.pool.clone()).overview(&tenant).await?))
}
