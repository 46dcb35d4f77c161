use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::billing::{BillingService, Quota};
use super::{ServiceError, ServiceResult};
use crate::config::DomainConfig;
use crate::dns::TxtResolver;
use crate::tenancy::{is_valid_hostname, normalize_host, TenantContext, TenantResolver};

pub const TOKEN_PREFIX: &str = "cms-verification=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Pending,
    Verified,
    Failed,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Verified => "verified",
            DomainStatus::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for DomainStatus {
    type Error = ServiceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(DomainStatus::Pending),
            "verified" => Ok(DomainStatus::Verified),
            "failed" => Ok(DomainStatus::Failed),
            other => Err(ServiceError::BadRequest(format!("unknown domain status '{}'", other))),
        }
    }
}

/// The TXT record a tenant has to publish
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Domain {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub hostname: String,
    pub status: DomainStatus,
    pub attempts: i32,
    pub is_primary: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verification: VerificationRecord,
    #[serde(skip)]
    token: String,
}

#[derive(Debug, FromRow)]
struct DomainRow {
    id: Uuid,
    tenant_id: Uuid,
    hostname: String,
    verification_token: String,
    status: String,
    attempts: i32,
    is_primary: bool,
    last_checked_at: Option<DateTime<Utc>>,
    next_check_at: Option<DateTime<Utc>>,
    verified_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

const DOMAIN_COLUMNS: &str = "id, tenant_id, hostname, verification_token, status, attempts, is_primary, \
     last_checked_at, next_check_at, verified_at, last_error, created_at";

impl Domain {
    fn from_row(row: DomainRow, prefix: &str) -> ServiceResult<Self> {
        let verification = VerificationRecord {
            record_type: "TXT",
            name: record_name(prefix, &row.hostname),
            value: record_value(&row.verification_token),
        };
        Ok(Domain {
            id: row.id,
            tenant_id: row.tenant_id,
            status: DomainStatus::try_from(row.status.as_str())?,
            hostname: row.hostname,
            attempts: row.attempts,
            is_primary: row.is_primary,
            last_checked_at: row.last_checked_at,
            next_check_at: row.next_check_at,
            verified_at: row.verified_at,
            last_error: row.last_error,
            created_at: row.created_at,
            verification,
            token: row.verification_token,
        })
    }
}

pub fn record_name(prefix: &str, hostname: &str) -> String {
    format!("{}.{}", prefix, hostname)
}

pub fn record_value(token: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, token)
}

/// Delay before the next check after `attempts` failed checks
pub fn backoff(attempts: i32, base_secs: u64, max_secs: u64) -> Duration {
    let exponent = attempts.saturating_sub(1).max(0) as u32;
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    Duration::from_secs(base_secs.saturating_mul(factor).min(max_secs))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Verified,
    Retry(Duration),
    Failed,
}

/// Decide what one check means for a domain that has now been checked
/// `attempts` times
pub fn decide(found: bool, attempts: i32, config: &DomainConfig) -> CheckOutcome {
    if found {
        CheckOutcome::Verified
    } else if attempts >= config.max_attempts {
        CheckOutcome::Failed
    } else {
        CheckOutcome::Retry(backoff(attempts, config.backoff_base_secs, config.backoff_max_secs))
    }
}

/// True when any TXT string carries exactly the expected token
pub fn records_contain(records: &[String], token: &str) -> bool {
    let expected = record_value(token);
    records.iter().any(|r| r.trim() == expected)
}

/// Looks up verification records and persists the outcome
#[derive(Clone)]
pub struct DomainVerifier {
    pool: PgPool,
    dns: Arc<dyn TxtResolver>,
    resolver: Arc<TenantResolver>,
    config: DomainConfig,
}

impl DomainVerifier {
    pub fn new(pool: PgPool, dns: Arc<dyn TxtResolver>, resolver: Arc<TenantResolver>, config: DomainConfig) -> Self {
        Self {
            pool,
            dns,
            resolver,
            config,
        }
    }

    /// Run one check for a pending domain and return its updated state
    pub async fn check(&self, domain: &Domain) -> ServiceResult<Domain> {
        let name = record_name(&self.config.txt_record_prefix, &domain.hostname);
        let (found, error) = match self.dns.lookup_txt(&name).await {
            Ok(records) => (records_contain(&records, &domain.token), None),
            Err(e) => {
                tracing::warn!(hostname = %domain.hostname, "TXT lookup failed: {}", e);
                (false, Some(e.to_string()))
            }
        };

        let attempts = domain.attempts + 1;
        let outcome = decide(found, attempts, &self.config);
        let last_error = error.unwrap_or_else(|| format!("TXT record {} not found", name));

        let sql = match &outcome {
            CheckOutcome::Verified => format!(
                r#"
                UPDATE domains SET status = 'verified', attempts = $2, verified_at = now(),
                    last_checked_at = now(), next_check_at = NULL, last_error = NULL, updated_at = now()
                WHERE id = $1 AND status = 'pending'
                RETURNING {}
                "#,
                DOMAIN_COLUMNS
            ),
            CheckOutcome::Retry(_) => format!(
                r#"
                UPDATE domains SET attempts = $2, last_checked_at = now(), next_check_at = $3,
                    last_error = $4, updated_at = now()
                WHERE id = $1 AND status = 'pending'
                RETURNING {}
                "#,
                DOMAIN_COLUMNS
            ),
            CheckOutcome::Failed => format!(
                r#"
                UPDATE domains SET status = 'failed', attempts = $2, last_checked_at = now(),
                    next_check_at = NULL, last_error = $4, updated_at = now()
                WHERE id = $1 AND status = 'pending'
                RETURNING {}
                "#,
                DOMAIN_COLUMNS
            ),
        };

        let next_check_at = match &outcome {
            CheckOutcome::Retry(delay) => Some(Utc::now() + chrono::Duration::seconds(delay.as_secs() as i64)),
            _ => None,
        };

        let row: Option<DomainRow> = sqlx::query_as(&sql)
            .bind(domain.id)
            .bind(attempts)
            .bind(next_check_at)
            .bind(&last_error)
            .fetch_optional(&self.pool)
            .await?;

        // Another check finished first; report what it recorded
        let Some(row) = row else {
            return self.reload(domain.id).await;
        };

        match outcome {
            CheckOutcome::Verified => {
                tracing::info!(hostname = %domain.hostname, tenant_id = %domain.tenant_id, "Domain verified");
                self.resolver.invalidate_host(&domain.hostname).await;
            }
            CheckOutcome::Failed => {
                tracing::warn!(hostname = %domain.hostname, attempts, "Domain verification failed");
            }
            CheckOutcome::Retry(delay) => {
                tracing::debug!(hostname = %domain.hostname, attempts, "Next check in {}s", delay.as_secs());
            }
        }
        Domain::from_row(row, &self.config.txt_record_prefix)
    }

    /// Check every pending domain whose next check is due. Returns how many
    /// were checked.
    pub async fn sweep_due(&self, limit: i64) -> ServiceResult<usize> {
        let sql = format!(
            r#"
            SELECT {} FROM domains
            WHERE status = 'pending' AND next_check_at <= now()
            ORDER BY next_check_at
            LIMIT $1
            "#,
            DOMAIN_COLUMNS
        );
        let rows: Vec<DomainRow> = sqlx::query_as(&sql).bind(limit).fetch_all(&self.pool).await?;

        let mut checked = 0;
        for row in rows {
            let domain = Domain::from_row(row, &self.config.txt_record_prefix)?;
            match self.check(&domain).await {
                Ok(_) => checked += 1,
                Err(e) => tracing::error!(hostname = %domain.hostname, "Domain check failed: {}", e),
            }
        }
        Ok(checked)
    }

    async fn reload(&self, id: Uuid) -> ServiceResult<Domain> {
        let sql = format!("SELECT {} FROM domains WHERE id = $1", DOMAIN_COLUMNS);
        let row: DomainRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Domain"))?;
        Domain::from_row(row, &self.config.txt_record_prefix)
    }
}

/// Tenant-facing domain management
pub struct DomainService {
    pool: PgPool,
    verifier: DomainVerifier,
    base_domain: String,
}

impl DomainService {
    pub fn new(verifier: DomainVerifier, base_domain: impl Into<String>) -> Self {
        Self {
            pool: verifier.pool.clone(),
            verifier,
            base_domain: base_domain.into(),
        }
    }

    fn prefix(&self) -> &str {
        &self.verifier.config.txt_record_prefix
    }

    pub async fn list(&self, tenant: &TenantContext) -> ServiceResult<Vec<Domain>> {
        let sql = format!(
            "SELECT {} FROM domains WHERE tenant_id = $1 ORDER BY is_primary DESC, hostname",
            DOMAIN_COLUMNS
        );
        let rows: Vec<DomainRow> = sqlx::query_as(&sql).bind(tenant.id).fetch_all(&self.pool).await?;
        rows.into_iter().map(|row| Domain::from_row(row, self.prefix())).collect()
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Domain> {
        let sql = format!("SELECT {} FROM domains WHERE id = $1 AND tenant_id = $2", DOMAIN_COLUMNS);
        let row: DomainRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Domain"))?;
        Domain::from_row(row, self.prefix())
    }

    pub async fn add(&self, tenant: &TenantContext, hostname: &str) -> ServiceResult<Domain> {
        let hostname = self.validate_hostname(hostname)?;
        BillingService::new(self.pool.clone())
            .ensure_quota(tenant, Quota::Domains)
            .await?;

        let token = Uuid::new_v4().simple().to_string();
        let sql = format!(
            r#"
            INSERT INTO domains (tenant_id, hostname, verification_token, next_check_at)
            VALUES ($1, $2, $3, now())
            RETURNING {}
            "#,
            DOMAIN_COLUMNS
        );
        let row: DomainRow = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&hostname)
            .bind(&token)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match crate::database::map_sqlx_error(e) {
                crate::database::DatabaseError::Conflict(_) => {
                    ServiceError::Conflict(format!("{} is already registered", hostname))
                }
                other => other.into(),
            })?;

        tracing::info!(tenant_id = %tenant.id, %hostname, "Domain added");
        Domain::from_row(row, self.prefix())
    }

    /// Check now. A failed domain starts a fresh round of attempts.
    pub async fn verify_now(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Domain> {
        let domain = self.get(tenant, id).await?;
        let domain = match domain.status {
            DomainStatus::Verified => return Ok(domain),
            DomainStatus::Pending => domain,
            DomainStatus::Failed => {
                sqlx::query(
                    "UPDATE domains SET status = 'pending', attempts = 0, updated_at = now() WHERE id = $1 AND status = 'failed'",
                )
                .bind(id)
                .execute(&self.pool)
                .await?;
                self.get(tenant, id).await?
            }
        };
        self.verifier.check(&domain).await
    }

    /// Mark a verified domain as the tenant's primary one
    pub async fn set_primary(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Domain> {
        let domain = self.get(tenant, id).await?;
        if domain.status != DomainStatus::Verified {
            return Err(ServiceError::Conflict("only verified domains can be primary".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE domains SET is_primary = FALSE, updated_at = now() WHERE tenant_id = $1 AND is_primary")
            .bind(tenant.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE domains SET is_primary = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get(tenant, id).await
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let hostname: Option<String> =
            sqlx::query_scalar("DELETE FROM domains WHERE id = $1 AND tenant_id = $2 RETURNING hostname")
                .bind(id)
                .bind(tenant.id)
                .fetch_optional(&self.pool)
                .await?;
        let hostname = hostname.ok_or(ServiceError::NotFound("Domain"))?;
        self.verifier.resolver.invalidate_host(&hostname).await;
        tracing::info!(tenant_id = %tenant.id, %hostname, "Domain removed");
        Ok(())
    }

    /// Normalise and reject hostnames that cannot be custom domains
    pub fn validate_hostname(&self, raw: &str) -> ServiceResult<String> {
        let hostname = normalize_host(raw)
            .filter(|h| is_valid_hostname(h) && h.contains('.'))
            .ok_or_else(|| ServiceError::validation("hostname", "must be a fully qualified domain name"))?;

        let base = self.base_domain.as_str();
        if hostname == base || hostname.ends_with(&format!(".{}", base)) {
            return Err(ServiceError::validation(
                "hostname",
                "subdomains of the platform domain cannot be added",
            ));
        }
        Ok(hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::dns::DnsError;
    use crate::tenancy::TenantLookup;
    use async_trait::async_trait;

    fn config() -> DomainConfig {
        DomainConfig {
            txt_record_prefix: "_cms-verify".to_string(),
            doh_endpoint: "https://dns.example/resolve".to_string(),
            max_attempts: 5,
            backoff_base_secs: 60,
            backoff_max_secs: 3600,
            sweep_interval_secs: 60,
        }
    }

    struct NoTenants;

    #[async_trait]
    impl TenantLookup for NoTenants {
        async fn by_slug(&self, _slug: &str) -> Result<Option<TenantContext>, crate::database::DatabaseError> {
            Ok(None)
        }
        async fn by_domain(&self, _host: &str) -> Result<Option<TenantContext>, crate::database::DatabaseError> {
            Ok(None)
        }
    }

    struct NoRecords;

    #[async_trait]
    impl TxtResolver for NoRecords {
        async fn lookup_txt(&self, _name: &str) -> Result<Vec<String>, DnsError> {
            Ok(Vec::new())
        }
    }

    fn service() -> DomainService {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let tenancy = TenancyConfig {
            base_domain: "cms.example".to_string(),
            resolver_ttl_secs: 60,
            resolver_negative_ttl_secs: 10,
        };
        let resolver = Arc::new(TenantResolver::new(Arc::new(NoTenants), &tenancy));
        let verifier = DomainVerifier::new(pool, Arc::new(NoRecords), resolver, config());
        DomainService::new(verifier, "cms.example")
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        assert_eq!(backoff(1, 60, 3600), Duration::from_secs(60));
        assert_eq!(backoff(2, 60, 3600), Duration::from_secs(120));
        assert_eq!(backoff(4, 60, 3600), Duration::from_secs(480));
        assert_eq!(backoff(10, 60, 3600), Duration::from_secs(3600));
        assert_eq!(backoff(200, 60, 3600), Duration::from_secs(3600));
        assert_eq!(backoff(0, 60, 3600), Duration::from_secs(60));
    }

    #[test]
    fn outcome_depends_on_attempts() {
        let config = config();
        assert_eq!(decide(true, 5, &config), CheckOutcome::Verified);
        assert_eq!(decide(false, 1, &config), CheckOutcome::Retry(Duration::from_secs(60)));
        assert_eq!(decide(false, 4, &config), CheckOutcome::Retry(Duration::from_secs(480)));
        assert_eq!(decide(false, 5, &config), CheckOutcome::Failed);
    }

    #[test]
    fn token_must_match_exactly() {
        let records = vec!["v=spf1 -all".to_string(), " cms-verification=abc123 ".to_string()];
        assert!(records_contain(&records, "abc123"));
        assert!(!records_contain(&records, "abc"));
        assert!(!records_contain(&[], "abc123"));
        assert_eq!(record_name("_cms-verify", "www.acme.com"), "_cms-verify.www.acme.com");
    }

    #[tokio::test]
    async fn hostnames_are_normalised_and_checked() {
        let service = service();
        assert_eq!(service.validate_hostname("WWW.Acme.COM.").unwrap(), "www.acme.com");
        assert!(service.validate_hostname("localhost").is_err());
        assert!(service.validate_hostname("bad host.com").is_err());
        assert!(service.validate_hostname("acme.cms.example").is_err());
        assert!(service.validate_hostname("cms.example").is_err());
        assert!(service.validate_hostname("notcms.example").is_ok());
    }
}
