// handlers/protected/team.rs - /api/team

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::team::{CreateTeamMember, TeamMember, TeamService, UpdateTeamMember};
use crate::tenancy::TenantContext;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<TeamMember>> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(TeamService::new(state.pool.clone()).list(&tenant, pagination).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<TeamMember> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(TeamService::new(state.pool.clone()).get(&tenant, id).await?))
}

/// POST /api/team - 403 once the plan's team member limit is reached
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreateTeamMember>,
) -> ApiResult<TeamMember> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::created(TeamService::new(state.pool.clone()).create(&tenant, input).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTeamMember>,
) -> ApiResult<TeamMember> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(TeamService::new(state.pool.clone()).update(&tenant, id, input).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    TeamService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
