// handlers/protected/domains.rs - /api/domains
//
// Tenant admins attach custom hostnames. A domain starts `pending`; the
// response carries the TXT record to publish. The background sweep re-checks
// pending domains with backoff, and `/verify` checks immediately.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::domains::Domain;
use crate::tenancy::TenantContext;

#[derive(Debug, Deserialize)]
pub struct AddDomain {
    pub hostname: String,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
) -> ApiResult<Vec<Domain>> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(state.domains().list(&tenant).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Domain> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(state.domains().get(&tenant, id).await?))
}

/**
 * POST /api/domains - Register a hostname
 *
 * ```json
 * { "hostname": "www.acme.com" }
 * ```
 *
 * Response `verification` holds the record to publish, e.g.
 * `_cms-verification.www.acme.com TXT "cms-verification=<token>"`.
 */
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<AddDomain>,
) -> ApiResult<Domain> {
    user.require(Role::Admin)?;
    let domain = state.domains().add(&tenant, &input.hostname).await?;
    tracing::info!(tenant = %tenant.slug, domain_id = %domain.id, "Added domain {}", domain.hostname);
    Ok(ApiResponse::created(domain))
}

/// POST /api/domains/:id/verify - Check the TXT record now
pub async fn verify(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Domain> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(state.domains().verify_now(&tenant, id).await?))
}

/// POST /api/domains/:id/primary - Verified domains only
pub async fn set_primary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Domain> {
    user.require(Role::Admin)?;
    Ok(ApiResponse::success(state.domains().set_primary(&tenant, id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Admin)?;
    state.domains().delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}
