// handlers/protected/seo.rs - /api/seo

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::seo::{SeoEntry, SeoFilter, SeoInput, SeoService};
use crate::tenancy::TenantContext;

/// GET /api/seo?path=&language=
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<SeoFilter>,
) -> ApiResult<Vec<SeoEntry>> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(SeoService::new(state.pool.clone()).list(&tenant, &filter).await?))
}

/// PUT /api/seo - Upsert keyed by `(path, language)`
pub async fn upsert(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<SeoInput>,
) -> ApiResult<SeoEntry> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(SeoService::new(state.pool.clone()).upsert(&tenant, input).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    SeoService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
