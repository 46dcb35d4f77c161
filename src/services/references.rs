use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::media::ensure_tenant_media;
use super::{attach_translations, nullable, validate, ServiceError, ServiceResult, Translated};
use crate::database::{Paginated, Pagination, Translation, TranslationRepository, TranslationTable};
use crate::tenancy::TenantContext;

/// Portfolio entry (`project_references`)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reference {
    pub id: Uuid,
    pub slug: String,
    pub client_name: String,
    pub project_url: Option<String>,
    pub cover_media_id: Option<Uuid>,
    pub completed_on: Option<NaiveDate>,
    pub is_featured: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub translations: Vec<Translation>,
}

impl Translated for Reference {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_translations(&mut self, translations: Vec<Translation>) {
        self.translations = translations;
    }
}

const COLUMNS: &str =
    "id, slug, client_name, project_url, cover_media_id, completed_on, is_featured, sort_order, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateReference {
    pub slug: String,
    pub client_name: String,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub cover_media_id: Option<Uuid>,
    #[serde(default)]
    pub completed_on: Option<NaiveDate>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub sort_order: i32,
    pub translations: Vec<Translation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateReference {
    pub slug: Option<String>,
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub project_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub cover_media_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub completed_on: Option<Option<NaiveDate>>,
    pub is_featured: Option<bool>,
    pub sort_order: Option<i32>,
    pub translations: Option<Vec<Translation>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReferenceFilter {
    pub featured: Option<bool>,
}

pub struct ReferenceService {
    pool: PgPool,
}

impl ReferenceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        tenant: &TenantContext,
        filter: &ReferenceFilter,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<Reference>> {
        let sql = format!(
            r#"
            SELECT {} FROM project_references
            WHERE tenant_id = $1 AND ($2::BOOLEAN IS NULL OR is_featured = $2)
            ORDER BY sort_order, created_at
            LIMIT $3 OFFSET $4
            "#,
            COLUMNS
        );
        let mut items: Vec<Reference> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(filter.featured)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_references WHERE tenant_id = $1 AND ($2::BOOLEAN IS NULL OR is_featured = $2)",
        )
        .bind(tenant.id)
        .bind(filter.featured)
        .fetch_one(&self.pool)
        .await?;
        attach_translations(&self.pool, TranslationTable::Reference, &mut items).await?;
        Ok(Paginated::new(items, pagination, total))
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Reference> {
        let sql = format!("SELECT {} FROM project_references WHERE id = $1 AND tenant_id = $2", COLUMNS);
        let mut item: Reference = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Reference"))?;
        item.translations = TranslationRepository::load_one(&self.pool, TranslationTable::Reference, id).await?;
        Ok(item)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreateReference) -> ServiceResult<Reference> {
        validate::slug("slug", &input.slug)?;
        validate::not_blank("client_name", &input.client_name)?;
        if let Some(url) = &input.project_url {
            validate::http_url("project_url", url)?;
        }
        validate::translations(tenant, &input.translations, true)?;
        if let Some(media_id) = input.cover_media_id {
            ensure_tenant_media(&self.pool, tenant, media_id, "cover_media_id").await?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO project_references
                (tenant_id, slug, client_name, project_url, cover_media_id, completed_on, is_featured, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            COLUMNS
        );
        let mut item: Reference = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.slug)
            .bind(input.client_name.trim())
            .bind(&input.project_url)
            .bind(input.cover_media_id)
            .bind(input.completed_on)
            .bind(input.is_featured)
            .bind(input.sort_order)
            .fetch_one(&mut *tx)
            .await?;
        TranslationRepository::replace(&mut tx, TranslationTable::Reference, item.id, &input.translations).await?;
        tx.commit().await?;

        item.translations = input.translations;
        Ok(item)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdateReference) -> ServiceResult<Reference> {
        if let Some(slug) = &input.slug {
            validate::slug("slug", slug)?;
        }
        if let Some(name) = &input.client_name {
            validate::not_blank("client_name", name)?;
        }
        if let Some(Some(url)) = &input.project_url {
            validate::http_url("project_url", url)?;
        }
        if let Some(Some(media_id)) = input.cover_media_id {
            ensure_tenant_media(&self.pool, tenant, media_id, "cover_media_id").await?;
        }
        if let Some(translations) = &input.translations {
            validate::translations(tenant, translations, false)?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE project_references SET
                slug = COALESCE($3, slug),
                client_name = COALESCE($4, client_name),
                project_url = CASE WHEN $5 THEN $6 ELSE project_url END,
                cover_media_id = CASE WHEN $7 THEN $8 ELSE cover_media_id END,
                completed_on = CASE WHEN $9 THEN $10 ELSE completed_on END,
                is_featured = COALESCE($11, is_featured),
                sort_order = COALESCE($12, sort_order),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        let mut item: Reference = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&input.slug)
            .bind(input.client_name.as_deref().map(str::trim))
            .bind(input.project_url.is_some())
            .bind(input.project_url.clone().flatten())
            .bind(input.cover_media_id.is_some())
            .bind(input.cover_media_id.flatten())
            .bind(input.completed_on.is_some())
            .bind(input.completed_on.flatten())
            .bind(input.is_featured)
            .bind(input.sort_order)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::NotFound("Reference"))?;
        if let Some(translations) = &input.translations {
            TranslationRepository::replace(&mut tx, TranslationTable::Reference, id, translations).await?;
        }
        tx.commit().await?;

        item.translations = match input.translations {
            Some(translations) => translations,
            None => TranslationRepository::load_one(&self.pool, TranslationTable::Reference, id).await?,
        };
        Ok(item)
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM project_references WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Reference"));
        }
        Ok(())
    }
}
