// handlers/public/site.rs - Public site API
//
// Tenant comes from the Host header. `?lang=` picks the translation, falling
// back to the tenant's default language and then to any translation.

use axum::{
    extract::{Path, Query, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    Extension,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, SiteHost};
use crate::services::seo::SeoEntry;
use crate::services::site::{LangQuery, SiteInfo, SiteMenu, SiteOffering, SitePage, SiteReference, SiteTeamMember};
use crate::tenancy::TenantContext;

/// GET /site - Name, languages, contact, social links and menus
pub async fn overview(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<LangQuery>,
) -> ApiResult<SiteInfo> {
    Ok(ApiResponse::success(state.site().overview(&tenant, query.lang.as_deref()).await?))
}

/// GET /site/pages/:slug - Published pages only
pub async fn page(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(slug): Path<String>,
    Query(query): Query<LangQuery>,
) -> ApiResult<SitePage> {
    Ok(ApiResponse::success(state.site().page(&tenant, &slug, query.lang.as_deref()).await?))
}

/// GET /site/menus/:location
pub async fn menu(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(location): Path<String>,
    Query(query): Query<LangQuery>,
) -> ApiResult<SiteMenu> {
    Ok(ApiResponse::success(state.site().menu(&tenant, &location, query.lang.as_deref()).await?))
}

/// GET /site/services
pub async fn offerings(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<LangQuery>,
) -> ApiResult<Vec<SiteOffering>> {
    Ok(ApiResponse::success(state.site().offerings(&tenant, query.lang.as_deref()).await?))
}

/// GET /site/team
pub async fn team(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<LangQuery>,
) -> ApiResult<Vec<SiteTeamMember>> {
    Ok(ApiResponse::success(state.site().team(&tenant, query.lang.as_deref()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceQuery {
    pub lang: Option<String>,
    pub featured: Option<bool>,
}

/// GET /site/references?featured=true
pub async fn references(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<ReferenceQuery>,
) -> ApiResult<Vec<SiteReference>> {
    let references = state
        .site()
        .references(&tenant, query.featured, query.lang.as_deref())
        .await?;
    Ok(ApiResponse::success(references))
}

#[derive(Debug, Default, Deserialize)]
pub struct SeoQuery {
    pub path: Option<String>,
    pub lang: Option<String>,
}

/// GET /site/seo?path=/about
pub async fn seo(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<SeoQuery>,
) -> ApiResult<SeoEntry> {
    let path = query
        .path
        .ok_or_else(|| ApiError::field_error("path", "query parameter is required"))?;
    Ok(ApiResponse::success(state.site().seo(&tenant, &path, query.lang.as_deref()).await?))
}

/// GET /sitemap.xml - Published pages in every enabled language
pub async fn sitemap(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Extension(SiteHost(host)): Extension<SiteHost>,
) -> Result<impl IntoResponse, ApiError> {
    let xml = state.site().sitemap(&tenant, &host).await?;
    Ok(([(CONTENT_TYPE, "application/xml; charset=utf-8")], xml))
}
