use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::app::AppState;
use crate::error::ApiError;
use crate::tenancy::TenantContext;

/// Lets a super admin pick the tenant a protected request operates on
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Loads the caller's tenant and injects it as [`TenantContext`].
///
/// Tenant users are bound to the tenant in their token. Super admins carry no
/// tenant and must name one with `X-Tenant-Id`. Inactive or deleted tenants
/// are refused.
pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("JWT authentication required before tenant validation"))?;

    let tenant_id = requested_tenant(&user, &headers)?;
    let tenant = TenantContext::load_by_id(&state.pool, tenant_id).await?;

    let Some(tenant) = tenant else {
        tracing::debug!(tenant_id = %tenant_id, user_id = %user.user_id, "Tenant unavailable for request");
        return Err(if user.is_super_admin() {
            ApiError::not_found("Tenant not found")
        } else {
            ApiError::forbidden("Tenant is inactive or has been deleted")
        });
    };

    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}

fn requested_tenant(user: &AuthUser, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    if let Some(id) = user.tenant_id {
        return Ok(id);
    }
    if !user.is_super_admin() {
        return Err(ApiError::forbidden("Token is not bound to a tenant"));
    }
    let raw = headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Super admins must select a tenant with the X-Tenant-Id header"))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request("X-Tenant-Id must be a UUID"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use axum::http::HeaderValue;

    fn user(role: Role, tenant_id: Option<Uuid>) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            tenant_id,
            tenant: None,
            role,
        }
    }

    #[test]
    fn tenant_users_ignore_the_header() {
        let own = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap());
        assert_eq!(requested_tenant(&user(Role::Admin, Some(own)), &headers).unwrap(), own);
    }

    #[test]
    fn super_admin_selects_by_header() {
        let chosen = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        assert!(requested_tenant(&user(Role::SuperAdmin, None), &headers).is_err());

        headers.insert(TENANT_HEADER, HeaderValue::from_str(&chosen.to_string()).unwrap());
        assert_eq!(requested_tenant(&user(Role::SuperAdmin, None), &headers).unwrap(), chosen);

        headers.insert(TENANT_HEADER, HeaderValue::from_static("acme"));
        assert!(requested_tenant(&user(Role::SuperAdmin, None), &headers).is_err());
    }

    #[test]
    fn unbound_tenant_user_is_refused() {
        let err = requested_tenant(&user(Role::Editor, None), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
