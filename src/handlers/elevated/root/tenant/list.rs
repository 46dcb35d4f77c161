// handlers/elevated/root/tenant/list.rs - GET /api/root/tenants handler

use axum::extract::{Query, State};

use crate::app::AppState;
use crate::database::{Paginated, Pagination};
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenants::{Tenant, TenantListQuery};

/// Paginated by slug; `?include_deleted=true` adds soft-deleted tenants
pub async fn tenant_list(
    State(state): State<AppState>,
    Query(query): Query<TenantListQuery>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<Tenant>> {
    let tenants = state.tenants().list(query.include_deleted, pagination).await?;
    Ok(ApiResponse::success(tenants))
}
