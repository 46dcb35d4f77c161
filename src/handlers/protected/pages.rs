// handlers/protected/pages.rs - /api/pages

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::pages::{CreatePage, Page, PageFilter, PageService, PageStatus, UpdatePage};
use crate::tenancy::TenantContext;

/// GET /api/pages?status=&page=&per_page=
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(filter): Query<PageFilter>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<Page>> {
    user.require(Role::Viewer)?;
    let pages = PageService::new(state.pool.clone()).list(&tenant, &filter, pagination).await?;
    Ok(ApiResponse::success(pages))
}

/// GET /api/pages/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Page> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(PageService::new(state.pool.clone()).get(&tenant, id).await?))
}

/**
 * POST /api/pages - Create a page
 *
 * ```json
 * {
 *   "slug": "about",
 *   "parent_id": null,
 *   "status": "draft",
 *   "translations": [{ "language": "en", "title": "About us", "body": "..." }]
 * }
 * ```
 *
 * A translation in the tenant's default language is required. Fails with 403
 * when the plan's page limit is reached.
 */
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreatePage>,
) -> ApiResult<Page> {
    user.require(Role::Editor)?;
    let page = PageService::new(state.pool.clone()).create(&tenant, input).await?;
    tracing::info!(tenant = %tenant.slug, page_id = %page.id, "Created page {}", page.slug);
    Ok(ApiResponse::created(page))
}

/// PUT /api/pages/:id - Partial update; `translations` replaces the set
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePage>,
) -> ApiResult<Page> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(PageService::new(state.pool.clone()).update(&tenant, id, input).await?))
}

/// POST /api/pages/:id/publish
pub async fn publish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Page> {
    user.require(Role::Editor)?;
    let page = PageService::new(state.pool.clone())
        .set_status(&tenant, id, PageStatus::Published)
        .await?;
    Ok(ApiResponse::success(page))
}

/// POST /api/pages/:id/unpublish - Back to draft
pub async fn unpublish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Page> {
    user.require(Role::Editor)?;
    let page = PageService::new(state.pool.clone())
        .set_status(&tenant, id, PageStatus::Draft)
        .await?;
    Ok(ApiResponse::success(page))
}

/// DELETE /api/pages/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    PageService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
