// handlers/protected/menus.rs - /api/menus

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::menus::{Menu, MenuInput, MenuItemInput, MenuService};
use crate::tenancy::TenantContext;

/// GET /api/menus - Every menu with its item tree
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<Menu>> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(MenuService::new(state.pool.clone()).list(&tenant).await?))
}

/// GET /api/menus/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Menu> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(MenuService::new(state.pool.clone()).get(&tenant, id).await?))
}

/// POST /api/menus - `{ "location": "header", "name": "Main" }`
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<MenuInput>,
) -> ApiResult<Menu> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::created(MenuService::new(state.pool.clone()).create(&tenant, input).await?))
}

/// PUT /api/menus/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<MenuInput>,
) -> ApiResult<Menu> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(MenuService::new(state.pool.clone()).update(&tenant, id, input).await?))
}

/**
 * PUT /api/menus/:id/items - Replace the item tree
 *
 * ```json
 * [
 *   { "page_id": "...", "translations": [{ "language": "en", "title": "Home" }] },
 *   { "url": "https://shop.example.com", "target": "_blank",
 *     "translations": [{ "language": "en", "title": "Shop" }],
 *     "children": [] }
 * ]
 * ```
 *
 * Each item links either a page of this tenant or a URL. Nesting is limited
 * to three levels.
 */
pub async fn replace_items(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(items): Json<Vec<MenuItemInput>>,
) -> ApiResult<Menu> {
    user.require(Role::Editor)?;
    let menu = MenuService::new(state.pool.clone()).replace_items(&tenant, id, items).await?;
    Ok(ApiResponse::success(menu))
}

/// DELETE /api/menus/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    MenuService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
