// handlers/protected/contact.rs - GET/PUT /api/contact

use axum::{extract::State, Extension, Json};

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::contact::{ContactInfo, ContactInput, ContactService};
use crate::tenancy::TenantContext;

/// GET /api/contact - Empty record until one is saved
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<ContactInfo> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(ContactService::new(state.pool.clone()).get(&tenant).await?))
}

/// PUT /api/contact - Upsert the whole record
pub async fn upsert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<ContactInput>,
) -> ApiResult<ContactInfo> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(ContactService::new(state.pool.clone()).upsert(&tenant, input).await?))
}
