use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{attach_translations, validate, ServiceError, ServiceResult, Translated};
use crate::database::{Paginated, Pagination, Translation, TranslationRepository, TranslationTable};
use crate::tenancy::TenantContext;

/// A service the tenant offers (`services` table)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServiceOffering {
    pub id: Uuid,
    pub slug: String,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub translations: Vec<Translation>,
}

impl Translated for ServiceOffering {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_translations(&mut self, translations: Vec<Translation>) {
        self.translations = translations;
    }
}

const COLUMNS: &str = "id, slug, icon, sort_order, is_active, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateOffering {
    pub slug: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub translations: Vec<Translation>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOffering {
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "super::nullable")]
    pub icon: Option<Option<String>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub translations: Option<Vec<Translation>>,
}

pub struct OfferingService {
    pool: PgPool,
}

impl OfferingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant: &TenantContext, pagination: Pagination) -> ServiceResult<Paginated<ServiceOffering>> {
        let sql = format!(
            "SELECT {} FROM services WHERE tenant_id = $1 ORDER BY sort_order, created_at LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let mut items: Vec<ServiceOffering> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM services WHERE tenant_id = $1")
            .bind(tenant.id)
            .fetch_one(&self.pool)
            .await?;
        attach_translations(&self.pool, TranslationTable::Service, &mut items).await?;
        Ok(Paginated::new(items, pagination, total))
    }

    /// Active offerings in display order, for the public site
    pub async fn list_active(&self, tenant: &TenantContext) -> ServiceResult<Vec<ServiceOffering>> {
        let sql = format!(
            "SELECT {} FROM services WHERE tenant_id = $1 AND is_active ORDER BY sort_order, created_at",
            COLUMNS
        );
        let mut items: Vec<ServiceOffering> = sqlx::query_as(&sql).bind(tenant.id).fetch_all(&self.pool).await?;
        attach_translations(&self.pool, TranslationTable::Service, &mut items).await?;
        Ok(items)
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<ServiceOffering> {
        let sql = format!("SELECT {} FROM services WHERE id = $1 AND tenant_id = $2", COLUMNS);
        let mut item: ServiceOffering = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Service"))?;
        item.translations = TranslationRepository::load_one(&self.pool, TranslationTable::Service, id).await?;
        Ok(item)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreateOffering) -> ServiceResult<ServiceOffering> {
        validate::slug("slug", &input.slug)?;
        validate::translations(tenant, &input.translations, true)?;

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO services (tenant_id, slug, icon, sort_order, is_active) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COLUMNS
        );
        let mut item: ServiceOffering = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.slug)
            .bind(&input.icon)
            .bind(input.sort_order)
            .bind(input.is_active)
            .fetch_one(&mut *tx)
            .await?;
        TranslationRepository::replace(&mut tx, TranslationTable::Service, item.id, &input.translations).await?;
        tx.commit().await?;

        item.translations = input.translations;
        Ok(item)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdateOffering) -> ServiceResult<ServiceOffering> {
        if let Some(slug) = &input.slug {
            validate::slug("slug", slug)?;
        }
        if let Some(translations) = &input.translations {
            validate::translations(tenant, translations, false)?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE services SET
                slug = COALESCE($3, slug),
                icon = CASE WHEN $4 THEN $5 ELSE icon END,
                sort_order = COALESCE($6, sort_order),
                is_active = COALESCE($7, is_active),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        let mut item: ServiceOffering = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&input.slug)
            .bind(input.icon.is_some())
            .bind(input.icon.clone().flatten())
            .bind(input.sort_order)
            .bind(input.is_active)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::NotFound("Service"))?;
        if let Some(translations) = &input.translations {
            TranslationRepository::replace(&mut tx, TranslationTable::Service, id, translations).await?;
        }
        tx.commit().await?;

        item.translations = match input.translations {
            Some(translations) => translations,
            None => TranslationRepository::load_one(&self.pool, TranslationTable::Service, id).await?,
        };
        Ok(item)
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Service"));
        }
        Ok(())
    }
}
