// handlers/protected/social.rs - /api/social

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::social::{CreateSocialLink, SocialLink, SocialService, UpdateSocialLink};
use crate::tenancy::TenantContext;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<SocialLink>> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(SocialService::new(state.pool.clone()).list(&tenant).await?))
}

/// POST /api/social - `{ "platform": "github", "url": "https://github.com/acme" }`
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreateSocialLink>,
) -> ApiResult<SocialLink> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::created(SocialService::new(state.pool.clone()).create(&tenant, input).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSocialLink>,
) -> ApiResult<SocialLink> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(SocialService::new(state.pool.clone()).update(&tenant, id, input).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    SocialService::new(state.pool.clone()).delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
