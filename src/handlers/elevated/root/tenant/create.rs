// handlers/elevated/root/tenant/create.rs - POST /api/root/tenants handler

use axum::{extract::State, Json};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::tenants::{CreateTenant, TenantCreated};

/**
 * POST /api/root/tenants - Create a tenant
 *
 * Expected Input:
 * ```json
 * {
 *   "slug": "acme",                 // Required: lowercase [a-z0-9-], becomes acme.<base_domain>
 *   "name": "Acme GmbH",            // Required
 *   "default_language": "de",       // Optional, defaults to "en"
 *   "languages": ["de", "en"],      // Optional, defaults to [default_language]
 *   "plan_id": "uuid",              // Optional, must be an active plan
 *   "admin": {                      // Optional first tenant admin
 *     "email": "owner@acme.test",
 *     "password": "at least 8 characters"
 *   }
 * }
 * ```
 *
 * Tenant and admin are written in one transaction. Duplicate slug → 409.
 */
pub async fn tenant_create(State(state): State<AppState>, Json(input): Json<CreateTenant>) -> ApiResult<TenantCreated> {
    let created = state.tenants().create(input).await?;
    Ok(ApiResponse::created(created))
}
