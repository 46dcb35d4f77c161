// handlers/protected/users.rs - /api/users (tenant admins)

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::users::{CreateUser, UpdateUser, User, UserService};
use crate::tenancy::TenantContext;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<User>> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(UserService::new(state.pool.clone()).list(&tenant, pagination).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(UserService::new(state.pool.clone()).get(&tenant, id).await?))
}

/**
 * POST /api/users - Add a user to this tenant
 *
 * ```json
 * { "email": "editor@acme.test", "password": "...", "display_name": "Eve", "role": "editor" }
 * ```
 *
 * `super_admin` cannot be granted here (403).
 */
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreateUser>,
) -> ApiResult<User> {
    user.require(Role::Admin)?;
    let created = UserService::new(state.pool.clone()).create(&tenant, input).await?;
    tracing::info!(tenant = %tenant.slug, user_id = %created.id, role = %created.role, "Created user");
    Ok(ApiResponse::created(created))
}

/// PUT /api/users/:id - Admins cannot demote or deactivate themselves
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> ApiResult<User> {
    user.require(Role::Admin)?;
    let updated = UserService::new(state.pool.clone())
        .update(&tenant, user.user_id, id, input)
        .await?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /api/users/:id - Not allowed on oneself
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Admin)?;
    UserService::new(state.pool.clone()).delete(&tenant, user.user_id, id).await?;
    Ok(ApiResponse::no_content())
}
