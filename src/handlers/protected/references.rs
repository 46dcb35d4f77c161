// handlers/protected/references.rs - /api/references

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::references::{CreateReference, Reference, ReferenceFilter, ReferenceService, UpdateReference};
use crate::tenancy::TenantContext;

/// GET /api/references?featured=true
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<ReferenceFilter>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<Reference>> {
    user.require(Role::Viewer)?;
    let references = ReferenceService::new(state.pool.clone())
        .list(&tenant, &filter, pagination)
        .await?;
    Ok(ApiResponse::success(references))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Reference> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(ReferenceService::new(state.pool.clone()).get(&tenant, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreateReference>,
) -> ApiResult<Reference> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::created(ReferenceService::new(state.pool.clone()).create(&tenant, input).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateReference>,
) -> ApiResult<Reference> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(ReferenceService::new(state.pool.clone()).update(&tenant, id, input).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    ReferenceService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
