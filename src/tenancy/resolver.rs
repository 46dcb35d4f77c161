use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_host, TenantContext};
use crate::config::TenancyConfig;
use crate::database::DatabaseError;

/// Cache entries beyond this count trigger a purge of expired entries
const MAX_CACHE_ENTRIES: usize = 10_000;

/// Source of truth behind the resolver cache
#[async_trait]
pub trait TenantLookup: Send + Sync {
    async fn by_slug(&self, slug: &str) -> Result<Option<TenantContext>, DatabaseError>;
    async fn by_domain(&self, hostname: &str) -> Result<Option<TenantContext>, DatabaseError>;
}

pub struct PgTenantLookup {
    pool: PgPool,
}

impl PgTenantLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantLookup for PgTenantLookup {
    async fn by_slug(&self, slug: &str) -> Result<Option<TenantContext>, DatabaseError> {
        TenantContext::load_by_slug(&self.pool, slug).await
    }

    async fn by_domain(&self, hostname: &str) -> Result<Option<TenantContext>, DatabaseError> {
        TenantContext::load_by_domain(&self.pool, hostname).await
    }
}

#[derive(Clone)]
struct CacheEntry {
    tenant: Option<TenantContext>,
    expires_at: Instant,
}

/// Maps request hosts to tenants.
///
/// `<slug>.<base_domain>` resolves by tenant slug; anything else must be a
/// verified custom domain. Hits and misses are cached separately; callers that
/// change tenants or domains must invalidate.
pub struct TenantResolver {
    lookup: Arc<dyn TenantLookup>,
    base_domain: String,
    ttl: Duration,
    negative_ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl TenantResolver {
    pub fn new(lookup: Arc<dyn TenantLookup>, config: &TenancyConfig) -> Self {
        Self {
            lookup,
            base_domain: config.base_domain.trim_end_matches('.').to_ascii_lowercase(),
            ttl: Duration::from_secs(config.resolver_ttl_secs),
            negative_ttl: Duration::from_secs(config.resolver_negative_ttl_secs),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn postgres(pool: PgPool, config: &TenancyConfig) -> Self {
        Self::new(Arc::new(PgTenantLookup::new(pool)), config)
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Tenant slug when `host` is a direct subdomain of the base domain
    pub fn subdomain_slug<'a>(&self, host: &'a str) -> Option<&'a str> {
        let prefix = host.strip_suffix(self.base_domain.as_str())?.strip_suffix('.')?;
        if prefix.is_empty() || prefix.contains('.') {
            return None;
        }
        Some(prefix)
    }

    pub async fn resolve(&self, raw_host: &str) -> Result<Option<TenantContext>, DatabaseError> {
        let Some(host) = normalize_host(raw_host) else {
            return Ok(None);
        };

        if let Some(entry) = self.cache.read().await.get(&host) {
            if entry.expires_at > Instant::now() {
                return Ok(entry.tenant.clone());
            }
        }

        let tenant = if host == self.base_domain {
            None
        } else if let Some(slug) = self.subdomain_slug(&host) {
            self.lookup.by_slug(slug).await?
        } else {
            self.lookup.by_domain(&host).await?
        };

        if tenant.is_none() {
            tracing::debug!(host = %host, "no tenant for host");
        }

        let ttl = if tenant.is_some() { self.ttl } else { self.negative_ttl };
        if !ttl.is_zero() {
            let mut cache = self.cache.write().await;
            if cache.len() >= MAX_CACHE_ENTRIES {
                let now = Instant::now();
                cache.retain(|_, e| e.expires_at > now);
                if cache.len() >= MAX_CACHE_ENTRIES {
                    cache.clear();
                }
            }
            cache.insert(
                host,
                CacheEntry {
                    tenant: tenant.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        Ok(tenant)
    }

    pub async fn invalidate_host(&self, raw_host: &str) {
        if let Some(host) = normalize_host(raw_host) {
            self.cache.write().await.remove(&host);
        }
    }

    /// Drop every cached entry for the tenant, and all cached misses (a new
    /// slug or domain may now resolve).
    pub async fn invalidate_tenant(&self, tenant_id: Uuid) {
        self.cache
            .write()
            .await
            .retain(|_, e| matches!(&e.tenant, Some(t) if t.id != tenant_id));
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        tenant: TenantContext,
        domain: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TenantLookup for CountingLookup {
        async fn by_slug(&self, slug: &str) -> Result<Option<TenantContext>, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((slug == self.tenant.slug).then(|| self.tenant.clone()))
        }

        async fn by_domain(&self, hostname: &str) -> Result<Option<TenantContext>, DatabaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((hostname == self.domain).then(|| self.tenant.clone()))
        }
    }

    fn setup(ttl: u64, negative_ttl: u64) -> (Arc<CountingLookup>, TenantResolver) {
        let lookup = Arc::new(CountingLookup {
            tenant: TenantContext {
                id: Uuid::new_v4(),
                slug: "acme".to_string(),
                name: "Acme".to_string(),
                default_language: "en".to_string(),
                languages: vec!["en".to_string()],
                plan_id: None,
            },
            domain: "www.acme.com".to_string(),
            calls: AtomicUsize::new(0),
        });
        let config = TenancyConfig {
            base_domain: "cms.test".to_string(),
            resolver_ttl_secs: ttl,
            resolver_negative_ttl_secs: negative_ttl,
        };
        let resolver = TenantResolver::new(lookup.clone(), &config);
        (lookup, resolver)
    }

    #[tokio::test]
    async fn resolves_subdomain_and_custom_domain() {
        let (_, resolver) = setup(60, 60);
        let by_slug = resolver.resolve("ACME.cms.test:443").await.unwrap().unwrap();
        assert_eq!(by_slug.slug, "acme");
        let by_domain = resolver.resolve("www.acme.com.").await.unwrap().unwrap();
        assert_eq!(by_domain.id, by_slug.id);

        assert!(resolver.resolve("cms.test").await.unwrap().is_none());
        assert!(resolver.resolve("deep.acme.cms.test").await.unwrap().is_none());
        assert!(resolver.resolve("unknown.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hits_are_cached_until_invalidated() {
        let (lookup, resolver) = setup(60, 60);
        resolver.resolve("acme.cms.test").await.unwrap();
        resolver.resolve("acme.cms.test").await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        resolver.invalidate_tenant(lookup.tenant.id).await;
        resolver.resolve("acme.cms.test").await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);

        resolver.invalidate_host("ACME.cms.test").await;
        resolver.resolve("acme.cms.test").await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn misses_use_negative_ttl() {
        let (lookup, resolver) = setup(60, 0);
        resolver.resolve("nobody.cms.test").await.unwrap();
        resolver.resolve("nobody.cms.test").await.unwrap();
        // Zero negative TTL: misses are never cached
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);

        let (lookup, resolver) = setup(60, 60);
        resolver.resolve("nobody.cms.test").await.unwrap();
        resolver.resolve("nobody.cms.test").await.unwrap();
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_host_never_hits_lookup() {
        let (lookup, resolver) = setup(60, 60);
        assert!(resolver.resolve("bad host").await.unwrap().is_none());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }
}
