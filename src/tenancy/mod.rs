pub mod resolver;

use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::database::DatabaseError;

pub use resolver::{PgTenantLookup, TenantLookup, TenantResolver};

/// The tenant a request operates on. Injected by the tenant middlewares and
/// read by every tenant-scoped service.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TenantContext {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub default_language: String,
    pub languages: Vec<String>,
    pub plan_id: Option<Uuid>,
}

const CONTEXT_COLUMNS: &str = "t.id, t.slug, t.name, t.default_language, t.languages, t.plan_id";

impl TenantContext {
    pub fn has_language(&self, language: &str) -> bool {
        self.languages.iter().any(|l| l == language)
    }

    /// Active, non-deleted tenant by id
    pub async fn load_by_id<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<Self>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM tenants t WHERE t.id = $1 AND t.is_active AND t.deleted_at IS NULL",
            CONTEXT_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(executor).await?)
    }

    pub async fn load_by_slug<'e, E: PgExecutor<'e>>(executor: E, slug: &str) -> Result<Option<Self>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM tenants t WHERE t.slug = $1 AND t.is_active AND t.deleted_at IS NULL",
            CONTEXT_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(slug).fetch_optional(executor).await?)
    }

    /// Tenant owning a verified custom domain
    pub async fn load_by_domain<'e, E: PgExecutor<'e>>(
        executor: E,
        hostname: &str,
    ) -> Result<Option<Self>, DatabaseError> {
        let sql = format!(
            r#"
            SELECT {} FROM domains d
            JOIN tenants t ON t.id = d.tenant_id
            WHERE d.hostname = $1 AND d.status = 'verified'
              AND t.is_active AND t.deleted_at IS NULL
            "#,
            CONTEXT_COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(hostname).fetch_optional(executor).await?)
    }
}

/// Lowercase, strip the port and any trailing dot. Returns `None` for values
/// that cannot be a hostname.
pub fn normalize_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        // IPv6 literal, keep as-is without brackets
        rest.split(']').next().unwrap_or_default()
    } else {
        match raw.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => host,
            Some(_) => return None,
            None => raw,
        }
    };

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || host.len() > 253 {
        return None;
    }
    if !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ':') {
        return None;
    }
    Some(host)
}

/// Stricter check used when a tenant registers a custom domain: at least two
/// labels, each 1..=63 chars of letters, digits and inner dashes.
pub fn is_valid_hostname(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() >= 2
        && host.len() <= 253
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        })
        && labels.last().is_some_and(|tld| tld.chars().any(|c| c.is_ascii_alphabetic()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hosts() {
        assert_eq!(normalize_host("Acme.Example.com").as_deref(), Some("acme.example.com"));
        assert_eq!(normalize_host("acme.example.com:8080").as_deref(), Some("acme.example.com"));
        assert_eq!(normalize_host("www.acme.test.").as_deref(), Some("www.acme.test"));
        assert_eq!(normalize_host("[::1]:3000").as_deref(), Some("::1"));
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("bad host"), None);
        assert_eq!(normalize_host("host:port"), None);
    }

    #[test]
    fn hostname_validation() {
        assert!(is_valid_hostname("www.acme.com"));
        assert!(is_valid_hostname("acme-shop.co.uk"));
        assert!(!is_valid_hostname("localhost"));
        assert!(!is_valid_hostname("-bad.com"));
        assert!(!is_valid_hostname("bad..com"));
        assert!(!is_valid_hostname("10.0.0.1"));
        assert!(!is_valid_hostname("UPPER.com"));
    }
}
