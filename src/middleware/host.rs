use axum::{
    extract::{Request, State},
    http::header::HOST,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::tenancy::normalize_host;

/// Normalised host the public site was requested on
#[derive(Clone, Debug)]
pub struct SiteHost(pub String);

/// Resolves the public-site tenant from the `Host` header (or the request
/// authority on HTTP/2) and injects it as `TenantContext`.
pub async fn host_tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
        .ok_or_else(|| ApiError::bad_request("Missing Host header"))?;

    let host = normalize_host(&raw).ok_or_else(|| ApiError::bad_request("Invalid Host header"))?;
    let Some(tenant) = state.resolver.resolve(&host).await? else {
        tracing::info!(host = %host, "No site for host");
        return Err(ApiError::not_found("Site not found"));
    };

    request.extensions_mut().insert(tenant);
    request.extensions_mut().insert(SiteHost(host));
    Ok(next.run(request).await)
}
