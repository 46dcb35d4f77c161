// app.rs - Application state and router assembly
//
// Four tiers of routes:
//   public     /, /health, /auth/*           no credentials
//   site       /site/*, /sitemap.xml         tenant resolved from the Host header
//   protected  /api/*                        bearer token + tenant context
//   elevated   /api/root/*                   bearer token with super_admin role

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeader,
    trace::TraceLayer,
};

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::dns::{DohResolver, TxtResolver};
use crate::handlers::{elevated, protected, public};
use crate::jobs::JobRegistry;
use crate::middleware::{
    host_tenant_middleware, jwt_auth_middleware, require_super_admin, tenant_context_middleware,
};
use crate::ops::{BackupService, OpsContext, UpdateService};
use crate::services::domains::{DomainService, DomainVerifier};
use crate::services::media::MediaService;
use crate::services::site::SiteService;
use crate::services::tenants::TenantService;
use crate::tenancy::TenantResolver;

/// Multipart framing on top of the largest accepted file
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Uploaded files never run as documents on the API origin
const MEDIA_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

/// Handles shared by every request
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub resolver: Arc<TenantResolver>,
    pub ops: OpsContext,
    pub verifier: DomainVerifier,
    pub http: reqwest::Client,
}

impl AppState {
    /// Production wiring: DNS-over-HTTPS for domain checks
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tenant-cms-api/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        let dns = DohResolver::new(http.clone(), &config.domains.doh_endpoint)?;
        Ok(Self::with_dns(pool, config, http, Arc::new(dns)))
    }

    pub fn with_dns(pool: PgPool, config: Arc<AppConfig>, http: reqwest::Client, dns: Arc<dyn TxtResolver>) -> Self {
        let resolver = Arc::new(TenantResolver::postgres(pool.clone(), &config.tenancy));
        let ops = OpsContext::new(pool.clone(), JobRegistry::new(), config.clone()).with_resolver(resolver.clone());
        let verifier = DomainVerifier::new(pool.clone(), dns, resolver.clone(), config.domains.clone());

        Self {
            jwt: JwtKeys::from_config(&config),
            pool,
            config,
            resolver,
            ops,
            verifier,
            http,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.ops.registry
    }

    pub fn backups(&self) -> BackupService {
        BackupService::new(self.ops.clone())
    }

    pub fn updates(&self) -> UpdateService {
        UpdateService::new(self.ops.clone(), self.http.clone())
    }

    pub fn domains(&self) -> DomainService {
        DomainService::new(self.verifier.clone(), self.config.tenancy.base_domain.clone())
    }

    pub fn media(&self) -> MediaService {
        MediaService::new(self.pool.clone(), self.config.media.clone())
    }

    pub fn site(&self) -> SiteService {
        SiteService::new(self.pool.clone(), self.config.media.clone())
    }

    pub fn tenants(&self) -> TenantService {
        TenantService::new(self.pool.clone()).with_resolver(self.resolver.clone())
    }
}

pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.media.max_upload_bytes + UPLOAD_OVERHEAD_BYTES;
    let cors = cors_layer(&state.config.security.cors_origins);
    let media_root = state.config.media.storage_root.clone();

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        // Host-resolved public site
        .merge(site_routes(state.clone()))
        // Authenticated
        .merge(account_routes(state.clone()))
        .merge(protected_routes(state.clone()))
        .merge(root_routes(state.clone()))
        // Uploaded files, read-only
        .nest_service("/media", media_service(media_root))
        // Global middleware
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    use public::auth;

    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
}

fn site_routes(state: AppState) -> Router<AppState> {
    use public::site;

    Router::new()
        .route("/site", get(site::overview))
        .route("/site/pages/:slug", get(site::page))
        .route("/site/menus/:location", get(site::menu))
        .route("/site/services", get(site::offerings))
        .route("/site/team", get(site::team))
        .route("/site/references", get(site::references))
        .route("/site/seo", get(site::seo))
        .route("/sitemap.xml", get(site::sitemap))
        .route_layer(from_fn_with_state(state, host_tenant_middleware))
}

/// Token-only routes; super admins have no tenant
fn account_routes(state: AppState) -> Router<AppState> {
    use protected::auth;

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/password", put(auth::change_password))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use protected::{billing, contact, domains, media, menus, offerings, pages, references, seo, social, team, tenant, users};

    Router::new()
        // Content
        .route("/api/pages", get(pages::list).post(pages::create))
        .route("/api/pages/:id", get(pages::show).put(pages::update).delete(pages::delete))
        .route("/api/pages/:id/publish", post(pages::publish))
        .route("/api/pages/:id/unpublish", post(pages::unpublish))
        .route("/api/menus", get(menus::list).post(menus::create))
        .route("/api/menus/:id", get(menus::show).put(menus::update).delete(menus::delete))
        .route("/api/menus/:id/items", put(menus::replace_items))
        .route("/api/services", get(offerings::list).post(offerings::create))
        .route("/api/services/:id", get(offerings::show).put(offerings::update).delete(offerings::delete))
        .route("/api/team", get(team::list).post(team::create))
        .route("/api/team/:id", get(team::show).put(team::update).delete(team::delete))
        .route("/api/references", get(references::list).post(references::create))
        .route("/api/references/:id", get(references::show).put(references::update).delete(references::delete))
        // Site settings
        .route("/api/contact", get(contact::show).put(contact::upsert))
        .route("/api/social", get(social::list).post(social::create))
        .route("/api/social/:id", put(social::update).delete(social::delete))
        .route("/api/seo", get(seo::list).put(seo::upsert))
        .route("/api/seo/:id", axum::routing::delete(seo::delete))
        // Media
        .route("/api/media", get(media::list).post(media::upload))
        .route("/api/media/:id", get(media::show).put(media::update).delete(media::delete))
        // Administration
        .route("/api/domains", get(domains::list).post(domains::create))
        .route("/api/domains/:id", get(domains::show).delete(domains::delete))
        .route("/api/domains/:id/verify", post(domains::verify))
        .route("/api/domains/:id/primary", post(domains::set_primary))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/:id", get(users::show).put(users::update).delete(users::delete))
        .route("/api/tenant", get(tenant::show).put(tenant::update))
        .route("/api/billing", get(billing::overview))
        // Layers run bottom-up: token first, then tenant
        .route_layer(from_fn_with_state(state.clone(), tenant_context_middleware))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn root_routes(state: AppState) -> Router<AppState> {
    use elevated::root::{backup, operation, plan, system, tenant, update};

    Router::new()
        .route("/api/root/tenants", get(tenant::tenant_list).post(tenant::tenant_create))
        .route(
            "/api/root/tenants/:id",
            get(tenant::tenant_show).patch(tenant::tenant_update).delete(tenant::tenant_delete),
        )
        .route("/api/root/tenants/:id/restore", post(tenant::tenant_restore))
        .route("/api/root/tenants/:id/plan", put(plan::plan_assign))
        .route("/api/root/plans", get(plan::plan_list).post(plan::plan_create))
        .route(
            "/api/root/plans/:id",
            get(plan::plan_show).put(plan::plan_update).delete(plan::plan_delete),
        )
        .route("/api/root/backups", get(backup::backup_list).post(backup::backup_create))
        .route("/api/root/backups/:id", get(backup::backup_show).delete(backup::backup_delete))
        .route("/api/root/backups/:id/restore", post(backup::backup_restore))
        .route("/api/root/operations", get(operation::operation_list))
        .route("/api/root/operations/:id", get(operation::operation_show))
        .route("/api/root/updates", get(update::update_history).post(update::update_start))
        .route("/api/root/updates/check", get(update::update_check))
        .route("/api/root/system", get(system::system_info))
        .route_layer(axum::middleware::from_fn(require_super_admin))
        .route_layer(from_fn_with_state(state, jwt_auth_middleware))
}

fn media_service(root: PathBuf) -> SetResponseHeader<SetResponseHeader<ServeDir, HeaderValue>, HeaderValue> {
    let files = SetResponseHeader::overriding(
        ServeDir::new(root),
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    SetResponseHeader::overriding(files, header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(MEDIA_CSP))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Tenant CMS API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Multi-tenant content management backend",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/login, /auth/refresh (public - token acquisition)",
                "site": "/site/*, /sitemap.xml (public - tenant from Host header)",
                "account": "/api/auth/whoami, /api/auth/password (protected)",
                "content": "/api/pages, /api/menus, /api/services, /api/team, /api/references (protected)",
                "settings": "/api/contact, /api/social, /api/seo, /api/media, /api/domains (protected)",
                "admin": "/api/users, /api/tenant, /api/billing (protected - tenant admin)",
                "root": "/api/root/* (restricted, requires super_admin)",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable"
                    }
                })),
            )
        }
    }
}
