use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use super::billing::BillingService;
use super::users::{insert_user, CreateUser, User};
use super::{nullable, validate, ServiceError, ServiceResult};
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::tenancy::TenantResolver;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub is_active: bool,
    pub plan_id: Option<Uuid>,
    pub default_language: String,
    pub languages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str =
    "id, slug, name, is_active, plan_id, default_language, languages, created_at, updated_at, deleted_at";

#[derive(Debug, Deserialize)]
pub struct InitialAdmin {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub plan_id: Option<Uuid>,
    #[serde(default)]
    pub admin: Option<InitialAdmin>,
}

#[derive(Debug, Serialize)]
pub struct TenantCreated {
    pub tenant: Tenant,
    pub admin: Option<User>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTenant {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub default_language: Option<String>,
    pub languages: Option<Vec<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub plan_id: Option<Option<Uuid>>,
}

/// What a tenant admin may change about their own tenant
#[derive(Debug, Default, Deserialize)]
pub struct UpdateOwnTenant {
    pub name: Option<String>,
    pub default_language: Option<String>,
    pub languages: Option<Vec<String>>,
}

impl From<UpdateOwnTenant> for UpdateTenant {
    fn from(own: UpdateOwnTenant) -> Self {
        UpdateTenant {
            name: own.name,
            default_language: own.default_language,
            languages: own.languages,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TenantListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

pub struct TenantService {
    pool: PgPool,
    resolver: Option<Arc<TenantResolver>>,
}

impl TenantService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, resolver: None }
    }

    /// Tenant changes drop cached host lookups
    pub fn with_resolver(mut self, resolver: Arc<TenantResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub async fn list(&self, include_deleted: bool, pagination: Pagination) -> ServiceResult<Paginated<Tenant>> {
        let sql = format!(
            r#"
            SELECT {} FROM tenants
            WHERE $1 OR deleted_at IS NULL
            ORDER BY slug
            LIMIT $2 OFFSET $3
            "#,
            COLUMNS
        );
        let tenants: Vec<Tenant> = sqlx::query_as(&sql)
            .bind(include_deleted)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants WHERE $1 OR deleted_at IS NULL")
            .bind(include_deleted)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paginated::new(tenants, pagination, total))
    }

    /// Any tenant, deleted ones included
    pub async fn get(&self, id: Uuid) -> ServiceResult<Tenant> {
        let sql = format!("SELECT {} FROM tenants WHERE id = $1", COLUMNS);
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Tenant"))
    }

    /// Create a tenant and, optionally, its first admin in one transaction
    pub async fn create(&self, input: CreateTenant) -> ServiceResult<TenantCreated> {
        validate::tenant_slug(&input.slug)?;
        validate::not_blank("name", &input.name)?;
        let default_language = input.default_language.unwrap_or_else(|| "en".to_string());
        let languages = input.languages.unwrap_or_else(|| vec![default_language.clone()]);
        validate::languages(&default_language, &languages)?;
        if let Some(plan_id) = input.plan_id {
            self.ensure_active_plan(plan_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO tenants (slug, name, plan_id, default_language, languages)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            COLUMNS
        );
        let tenant: Tenant = sqlx::query_as(&sql)
            .bind(&input.slug)
            .bind(input.name.trim())
            .bind(input.plan_id)
            .bind(&default_language)
            .bind(&languages)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match crate::database::map_sqlx_error(e) {
                crate::database::DatabaseError::Conflict(_) => {
                    ServiceError::Conflict(format!("tenant '{}' already exists", input.slug))
                }
                other => other.into(),
            })?;

        let admin = match input.admin {
            Some(admin) => {
                let create = CreateUser {
                    display_name: admin.display_name.unwrap_or_else(|| admin.email.clone()),
                    email: admin.email,
                    password: admin.password,
                    role: Role::Admin,
                };
                Some(insert_user(&mut *tx, Some(tenant.id), &create).await?)
            }
            None => None,
        };
        tx.commit().await?;

        tracing::info!(tenant_id = %tenant.id, "Created tenant {}", tenant.slug);
        self.invalidate(tenant.id).await;
        Ok(TenantCreated { tenant, admin })
    }

    pub async fn update(&self, id: Uuid, input: UpdateTenant) -> ServiceResult<Tenant> {
        let current = self.get(id).await?;
        if current.deleted_at.is_some() {
            return Err(ServiceError::Conflict("tenant is deleted; restore it first".to_string()));
        }
        if let Some(name) = &input.name {
            validate::not_blank("name", name)?;
        }
        if input.default_language.is_some() || input.languages.is_some() {
            let default_language = input.default_language.as_deref().unwrap_or(&current.default_language);
            let languages = input.languages.as_deref().unwrap_or(&current.languages);
            validate::languages(default_language, languages)?;
        }
        if let Some(Some(plan_id)) = input.plan_id {
            self.ensure_active_plan(plan_id).await?;
        }

        let sql = format!(
            r#"
            UPDATE tenants SET
                name = COALESCE($2, name),
                is_active = COALESCE($3, is_active),
                default_language = COALESCE($4, default_language),
                languages = COALESCE($5, languages),
                plan_id = CASE WHEN $6 THEN $7 ELSE plan_id END,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            COLUMNS
        );
        let tenant: Tenant = sqlx::query_as(&sql)
            .bind(id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(input.is_active)
            .bind(&input.default_language)
            .bind(&input.languages)
            .bind(input.plan_id.is_some())
            .bind(input.plan_id.flatten())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Tenant"))?;

        self.invalidate(id).await;
        Ok(tenant)
    }

    /// Soft delete; the tenant stops resolving but keeps its data
    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("UPDATE tenants SET deleted_at = now(), updated_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Tenant"));
        }
        tracing::info!(tenant_id = %id, "Tenant soft-deleted");
        self.invalidate(id).await;
        Ok(())
    }

    pub async fn restore(&self, id: Uuid) -> ServiceResult<Tenant> {
        let sql = format!(
            "UPDATE tenants SET deleted_at = NULL, updated_at = now() WHERE id = $1 AND deleted_at IS NOT NULL RETURNING {}",
            COLUMNS
        );
        let restored: Option<Tenant> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        match restored {
            Some(tenant) => {
                self.invalidate(id).await;
                Ok(tenant)
            }
            None => {
                // Distinguish a missing tenant from one that was never deleted
                self.get(id).await?;
                Err(ServiceError::Conflict("tenant is not deleted".to_string()))
            }
        }
    }

    async fn ensure_active_plan(&self, plan_id: Uuid) -> ServiceResult<()> {
        let plan = BillingService::new(self.pool.clone()).get_plan(plan_id).await.map_err(|e| match e {
            ServiceError::NotFound(_) => ServiceError::validation("plan_id", "plan does not exist"),
            other => other,
        })?;
        if !plan.is_active {
            return Err(ServiceError::validation("plan_id", "plan is not active"));
        }
        Ok(())
    }

    async fn invalidate(&self, tenant_id: Uuid) {
        if let Some(resolver) = &self.resolver {
            resolver.invalidate_tenant(tenant_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_update_cannot_touch_plan_or_status() {
        let own: UpdateOwnTenant = serde_json::from_value(serde_json::json!({
            "name": "Acme GmbH",
            "plan_id": "00000000-0000-0000-0000-000000000001",
            "is_active": false
        }))
        .unwrap();
        let update = UpdateTenant::from(own);
        assert_eq!(update.name.as_deref(), Some("Acme GmbH"));
        assert!(update.plan_id.is_none());
        assert!(update.is_active.is_none());
    }

    #[test]
    fn create_payload_with_admin() {
        let input: CreateTenant = serde_json::from_value(serde_json::json!({
            "slug": "acme",
            "name": "Acme",
            "admin": { "email": "owner@acme.test", "password": "correct-horse" }
        }))
        .unwrap();
        assert!(input.languages.is_none());
        let admin = input.admin.unwrap();
        assert!(admin.display_name.is_none());
    }
}
