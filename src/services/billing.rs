use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{validate, ServiceError, ServiceResult};
use crate::tenancy::TenantContext;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub billing_interval: String,
    pub max_pages: Option<i32>,
    pub max_media_bytes: Option<i64>,
    pub max_team_members: Option<i32>,
    pub max_domains: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PLAN_COLUMNS: &str = "id, code, name, description, price_cents, currency, billing_interval, \
     max_pages, max_media_bytes, max_team_members, max_domains, is_active, created_at, updated_at";

/// Create and full-replace payload. Omitted limits mean unlimited.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_interval")]
    pub billing_interval: String,
    #[serde(default)]
    pub max_pages: Option<i32>,
    #[serde(default)]
    pub max_media_bytes: Option<i64>,
    #[serde(default)]
    pub max_team_members: Option<i32>,
    #[serde(default)]
    pub max_domains: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_interval() -> String {
    "monthly".to_string()
}

fn default_true() -> bool {
    true
}

impl PlanInput {
    fn validate(&self) -> ServiceResult<()> {
        validate::slug("code", &self.code)?;
        validate::not_blank("name", &self.name)?;
        if self.price_cents < 0 {
            return Err(ServiceError::validation("price_cents", "must not be negative"));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ServiceError::validation("currency", "must be a three-letter ISO code"));
        }
        if !matches!(self.billing_interval.as_str(), "monthly" | "yearly") {
            return Err(ServiceError::validation("billing_interval", "must be 'monthly' or 'yearly'"));
        }
        let limits = [
            ("max_pages", self.max_pages.map(i64::from)),
            ("max_media_bytes", self.max_media_bytes),
            ("max_team_members", self.max_team_members.map(i64::from)),
            ("max_domains", self.max_domains.map(i64::from)),
        ];
        for (field, limit) in limits {
            if limit.is_some_and(|l| l < 0) {
                return Err(ServiceError::validation(field, "must not be negative"));
            }
        }
        Ok(())
    }
}

/// Counted resources of one tenant
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct Usage {
    pub pages: i64,
    pub team_members: i64,
    pub media_bytes: i64,
    pub domains: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitStatus {
    pub name: &'static str,
    pub limit: Option<i64>,
    pub used: i64,
    pub remaining: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingOverview {
    pub plan: Option<Plan>,
    pub usage: Usage,
    pub limits: Vec<LimitStatus>,
}

/// Resources a plan caps
#[derive(Debug, Clone, Copy)]
pub enum Quota {
    Pages,
    TeamMembers,
    Domains,
    /// Bytes about to be added
    MediaBytes(i64),
}

/// Fail with `PlanLimit` when adding `adding` to `used` would exceed `limit`
pub fn check_limit(name: &str, limit: Option<i64>, used: i64, adding: i64) -> ServiceResult<()> {
    match limit {
        Some(limit) if used.saturating_add(adding) > limit => Err(ServiceError::PlanLimit(format!(
            "{} allows {}, {} in use",
            name, limit, used
        ))),
        _ => Ok(()),
    }
}

pub struct BillingService {
    pool: PgPool,
}

impl BillingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_plans(&self) -> ServiceResult<Vec<Plan>> {
        let sql = format!("SELECT {} FROM billing_plans ORDER BY price_cents, code", PLAN_COLUMNS);
        Ok(sqlx::query_as(&sql).fetch_all(&self.pool).await?)
    }

    pub async fn get_plan(&self, id: Uuid) -> ServiceResult<Plan> {
        let sql = format!("SELECT {} FROM billing_plans WHERE id = $1", PLAN_COLUMNS);
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Plan"))
    }

    pub async fn create_plan(&self, input: PlanInput) -> ServiceResult<Plan> {
        input.validate()?;
        let sql = format!(
            r#"
            INSERT INTO billing_plans (code, name, description, price_cents, currency, billing_interval,
                max_pages, max_media_bytes, max_team_members, max_domains, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            PLAN_COLUMNS
        );
        let plan: Plan = bind_plan(sqlx::query_as(&sql), &input)
            .fetch_one(&self.pool)
            .await?;
        tracing::info!(plan_id = %plan.id, "Created billing plan {}", plan.code);
        Ok(plan)
    }

    pub async fn update_plan(&self, id: Uuid, input: PlanInput) -> ServiceResult<Plan> {
        input.validate()?;
        let sql = format!(
            r#"
            UPDATE billing_plans SET
                code = $1, name = $2, description = $3, price_cents = $4, currency = $5,
                billing_interval = $6, max_pages = $7, max_media_bytes = $8,
                max_team_members = $9, max_domains = $10, is_active = $11, updated_at = now()
            WHERE id = $12
            RETURNING {}
            "#,
            PLAN_COLUMNS
        );
        bind_plan(sqlx::query_as(&sql), &input)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Plan"))
    }

    /// Plans still assigned to a tenant cannot be deleted
    pub async fn delete_plan(&self, id: Uuid) -> ServiceResult<()> {
        let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE plan_id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if in_use > 0 {
            return Err(ServiceError::Conflict(format!("plan is assigned to {} tenant(s)", in_use)));
        }
        let result = sqlx::query("DELETE FROM billing_plans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Plan"));
        }
        Ok(())
    }

    /// Assign (or with `None`, remove) a tenant's plan. Only active plans can
    /// be assigned.
    pub async fn assign_plan(&self, tenant_id: Uuid, plan_id: Option<Uuid>) -> ServiceResult<()> {
        if let Some(plan_id) = plan_id {
            let plan = self.get_plan(plan_id).await?;
            if !plan.is_active {
                return Err(ServiceError::validation("plan_id", "plan is not active"));
            }
        }
        let result = sqlx::query("UPDATE tenants SET plan_id = $2, updated_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(tenant_id)
            .bind(plan_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Tenant"));
        }
        tracing::info!(%tenant_id, plan_id = ?plan_id, "Assigned billing plan");
        Ok(())
    }

    pub async fn usage(&self, tenant_id: Uuid) -> ServiceResult<Usage> {
        let usage: Usage = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM pages WHERE tenant_id = $1) AS pages,
                (SELECT COUNT(*) FROM team_members WHERE tenant_id = $1) AS team_members,
                (SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM media_assets WHERE tenant_id = $1) AS media_bytes,
                (SELECT COUNT(*) FROM domains WHERE tenant_id = $1) AS domains
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(usage)
    }

    pub async fn overview(&self, tenant: &TenantContext) -> ServiceResult<BillingOverview> {
        let plan = match tenant.plan_id {
            Some(id) => Some(self.get_plan(id).await?),
            None => None,
        };
        let usage = self.usage(tenant.id).await?;
        let limits = limit_statuses(plan.as_ref(), &usage);
        Ok(BillingOverview { plan, usage, limits })
    }

    /// Refuse when the tenant's plan has no room for one more of `quota`
    pub async fn ensure_quota(&self, tenant: &TenantContext, quota: Quota) -> ServiceResult<()> {
        let Some(plan_id) = tenant.plan_id else {
            return Ok(());
        };
        let plan = self.get_plan(plan_id).await?;
        let usage = self.usage(tenant.id).await?;
        match quota {
            Quota::Pages => check_limit("max_pages", plan.max_pages.map(i64::from), usage.pages, 1),
            Quota::TeamMembers => check_limit(
                "max_team_members",
                plan.max_team_members.map(i64::from),
                usage.team_members,
                1,
            ),
            Quota::Domains => check_limit("max_domains", plan.max_domains.map(i64::from), usage.domains, 1),
            Quota::MediaBytes(bytes) => check_limit("max_media_bytes", plan.max_media_bytes, usage.media_bytes, bytes),
        }
    }
}

fn bind_plan<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Plan, sqlx::postgres::PgArguments>,
    input: &'q PlanInput,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Plan, sqlx::postgres::PgArguments> {
    query
        .bind(&input.code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(&input.currency)
        .bind(&input.billing_interval)
        .bind(input.max_pages)
        .bind(input.max_media_bytes)
        .bind(input.max_team_members)
        .bind(input.max_domains)
        .bind(input.is_active)
}

pub fn limit_statuses(plan: Option<&Plan>, usage: &Usage) -> Vec<LimitStatus> {
    let limit = |f: fn(&Plan) -> Option<i64>| plan.and_then(f);
    let entries = [
        ("pages", limit(|p| p.max_pages.map(i64::from)), usage.pages),
        ("team_members", limit(|p| p.max_team_members.map(i64::from)), usage.team_members),
        ("media_bytes", limit(|p| p.max_media_bytes), usage.media_bytes),
        ("domains", limit(|p| p.max_domains.map(i64::from)), usage.domains),
    ];
    entries
        .into_iter()
        .map(|(name, limit, used)| LimitStatus {
            name,
            limit,
            used,
            remaining: limit.map(|l| (l - used).max(0)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> PlanInput {
        serde_json::from_value(serde_json::json!({
            "code": "starter",
            "name": "Starter",
            "price_cents": 900,
            "max_pages": 10
        }))
        .unwrap()
    }

    #[test]
    fn plan_input_defaults_and_validation() {
        let plan = input();
        assert_eq!(plan.currency, "EUR");
        assert_eq!(plan.billing_interval, "monthly");
        assert!(plan.is_active);
        assert!(plan.max_domains.is_none());
        assert!(plan.validate().is_ok());

        let mut bad = input();
        bad.currency = "euro".to_string();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.billing_interval = "weekly".to_string();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.max_pages = Some(-1);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn limits_apply_only_when_set() {
        assert!(check_limit("max_pages", None, 1_000, 1).is_ok());
        assert!(check_limit("max_pages", Some(10), 9, 1).is_ok());
        assert!(matches!(check_limit("max_pages", Some(10), 10, 1), Err(ServiceError::PlanLimit(_))));
        assert!(check_limit("max_media_bytes", Some(100), 50, 60).is_err());
        assert!(check_limit("max_domains", Some(0), 0, 1).is_err());
    }

    #[test]
    fn remaining_never_negative() {
        let usage = Usage {
            pages: 12,
            team_members: 1,
            media_bytes: 0,
            domains: 0,
        };
        let statuses = limit_statuses(None, &usage);
        assert!(statuses.iter().all(|s| s.limit.is_none() && s.remaining.is_none()));
        assert_eq!(statuses[0].used, 12);
    }
}
