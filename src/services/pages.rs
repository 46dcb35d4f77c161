use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::billing::{BillingService, Quota};
use super::{attach_translations, nullable, validate, ServiceError, ServiceResult, Translated};
use crate::database::{Paginated, Pagination, Translation, TranslationRepository, TranslationTable};
use crate::tenancy::TenantContext;

/// Longest ancestor chain followed when checking for parent cycles
const MAX_PAGE_DEPTH: i32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Draft,
    Published,
    Archived,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Draft => "draft",
            PageStatus::Published => "published",
            PageStatus::Archived => "archived",
        }
    }
}

impl TryFrom<&str> for PageStatus {
    type Error = ServiceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(PageStatus::Draft),
            "published" => Ok(PageStatus::Published),
            "archived" => Ok(PageStatus::Archived),
            other => Err(ServiceError::BadRequest(format!("unknown page status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub slug: String,
    pub status: PageStatus,
    pub template: String,
    pub sort_order: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub translations: Vec<Translation>,
}

#[derive(Debug, FromRow)]
struct PageRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    slug: String,
    status: String,
    template: String,
    sort_order: i32,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PageRow> for Page {
    type Error = ServiceError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        Ok(Page {
            status: PageStatus::try_from(row.status.as_str())?,
            id: row.id,
            parent_id: row.parent_id,
            slug: row.slug,
            template: row.template,
            sort_order: row.sort_order,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            translations: Vec::new(),
        })
    }
}

impl Translated for Page {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_translations(&mut self, translations: Vec<Translation>) {
        self.translations = translations;
    }
}

const PAGE_COLUMNS: &str = "id, parent_id, slug, status, template, sort_order, published_at, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreatePage {
    pub slug: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<PageStatus>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    pub translations: Vec<Translation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePage {
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Uuid>>,
    pub status: Option<PageStatus>,
    pub template: Option<String>,
    pub sort_order: Option<i32>,
    pub translations: Option<Vec<Translation>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageFilter {
    pub status: Option<PageStatus>,
}

pub struct PageService {
    pool: PgPool,
}

impl PageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        tenant: &TenantContext,
        filter: &PageFilter,
        pagination: Pagination,
    ) -> ServiceResult<Paginated<Page>> {
        let status = filter.status.map(|s| s.as_str());
        let sql = format!(
            r#"
            SELECT {} FROM pages
            WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY sort_order, created_at
            LIMIT $3 OFFSET $4
            "#,
            PAGE_COLUMNS
        );
        let rows: Vec<PageRow> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(status)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pages WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2)")
                .bind(tenant.id)
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        let mut pages = rows.into_iter().map(Page::try_from).collect::<ServiceResult<Vec<_>>>()?;
        attach_translations(&self.pool, TranslationTable::Page, &mut pages).await?;
        Ok(Paginated::new(pages, pagination, total))
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<Page> {
        let sql = format!("SELECT {} FROM pages WHERE id = $1 AND tenant_id = $2", PAGE_COLUMNS);
        let row: PageRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Page"))?;
        let mut page = Page::try_from(row)?;
        page.translations = TranslationRepository::load_one(&self.pool, TranslationTable::Page, page.id).await?;
        Ok(page)
    }

    /// Published page by slug, for the public site
    pub async fn get_published(&self, tenant: &TenantContext, slug: &str) -> ServiceResult<Page> {
        let sql = format!(
            "SELECT {} FROM pages WHERE tenant_id = $1 AND slug = $2 AND status = 'published'",
            PAGE_COLUMNS
        );
        let row: PageRow = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Page"))?;
        let mut page = Page::try_from(row)?;
        page.translations = TranslationRepository::load_one(&self.pool, TranslationTable::Page, page.id).await?;
        Ok(page)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreatePage) -> ServiceResult<Page> {
        validate::slug("slug", &input.slug)?;
        validate::translations(tenant, &input.translations, true)?;
        let template = input.template.unwrap_or_else(|| "default".to_string());
        validate::not_blank("template", &template)?;
        if let Some(parent_id) = input.parent_id {
            self.ensure_parent(tenant, None, parent_id).await?;
        }
        BillingService::new(self.pool.clone())
            .ensure_quota(tenant, Quota::Pages)
            .await?;

        let status = input.status.unwrap_or(PageStatus::Draft);
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO pages (tenant_id, parent_id, slug, status, template, sort_order, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $4 = 'published' THEN now() END)
            RETURNING {}
            "#,
            PAGE_COLUMNS
        );
        let row: PageRow = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(input.parent_id)
            .bind(&input.slug)
            .bind(status.as_str())
            .bind(&template)
            .bind(input.sort_order)
            .fetch_one(&mut *tx)
            .await?;
        TranslationRepository::replace(&mut tx, TranslationTable::Page, row.id, &input.translations).await?;
        tx.commit().await?;

        tracing::info!(tenant_id = %tenant.id, page_id = %row.id, "Created page {}", row.slug);
        let mut page = Page::try_from(row)?;
        page.translations = input.translations;
        Ok(page)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdatePage) -> ServiceResult<Page> {
        if let Some(slug) = &input.slug {
            validate::slug("slug", slug)?;
        }
        if let Some(template) = &input.template {
            validate::not_blank("template", template)?;
        }
        if let Some(translations) = &input.translations {
            validate::translations(tenant, translations, false)?;
        }
        if let Some(Some(parent_id)) = input.parent_id {
            self.ensure_parent(tenant, Some(id), parent_id).await?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE pages SET
                slug = COALESCE($3, slug),
                parent_id = CASE WHEN $4 THEN $5 ELSE parent_id END,
                status = COALESCE($6, status),
                published_at = CASE WHEN $6 = 'published' THEN COALESCE(published_at, now()) ELSE published_at END,
                template = COALESCE($7, template),
                sort_order = COALESCE($8, sort_order),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            PAGE_COLUMNS
        );
        let row: PageRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&input.slug)
            .bind(input.parent_id.is_some())
            .bind(input.parent_id.flatten())
            .bind(input.status.map(|s| s.as_str()))
            .bind(&input.template)
            .bind(input.sort_order)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::NotFound("Page"))?;
        if let Some(translations) = &input.translations {
            TranslationRepository::replace(&mut tx, TranslationTable::Page, id, translations).await?;
        }
        tx.commit().await?;

        let mut page = Page::try_from(row)?;
        page.translations = match input.translations {
            Some(translations) => translations,
            None => TranslationRepository::load_one(&self.pool, TranslationTable::Page, id).await?,
        };
        Ok(page)
    }

    pub async fn set_status(&self, tenant: &TenantContext, id: Uuid, status: PageStatus) -> ServiceResult<Page> {
        self.update(
            tenant,
            id,
            UpdatePage {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM pages WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Page"));
        }
        Ok(())
    }

    /// The parent must belong to the tenant and must not have `page_id` among
    /// its ancestors
    async fn ensure_parent(&self, tenant: &TenantContext, page_id: Option<Uuid>, parent_id: Uuid) -> ServiceResult<()> {
        let ancestors: Vec<Uuid> = sqlx::query_scalar(
            r#"
            WITH RECURSIVE chain (id, parent_id, depth) AS (
                SELECT id, parent_id, 1 FROM pages WHERE id = $1 AND tenant_id = $2
                UNION ALL
                SELECT p.id, p.parent_id, c.depth + 1
                FROM pages p JOIN chain c ON p.id = c.parent_id
                WHERE c.depth < $3
            )
            SELECT id FROM chain
            "#,
        )
        .bind(parent_id)
        .bind(tenant.id)
        .bind(MAX_PAGE_DEPTH)
        .fetch_all(&self.pool)
        .await?;

        if ancestors.is_empty() {
            return Err(ServiceError::validation("parent_id", "parent page does not exist"));
        }
        if let Some(page_id) = page_id {
            if creates_cycle(page_id, &ancestors) {
                return Err(ServiceError::validation("parent_id", "a page cannot be nested below itself"));
            }
        }
        Ok(())
    }
}

/// `chain` is the proposed parent followed by its ancestors
pub fn creates_cycle(page_id: Uuid, chain: &[Uuid]) -> bool {
    chain.contains(&page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        for status in [PageStatus::Draft, PageStatus::Published, PageStatus::Archived] {
            assert_eq!(PageStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(PageStatus::try_from("deleted").is_err());
    }

    #[test]
    fn update_distinguishes_null_parent() {
        let absent: UpdatePage = serde_json::from_str(r#"{"slug": "about"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: UpdatePage = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdatePage = serde_json::from_value(serde_json::json!({ "parent_id": id })).unwrap();
        assert_eq!(set.parent_id, Some(Some(id)));
    }

    #[test]
    fn cycles_detected_along_chain() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // Moving `a` below `c`, where c -> b -> a
        assert!(creates_cycle(a, &[c, b, a]));
        // Parent is the page itself
        assert!(creates_cycle(a, &[a]));
        assert!(!creates_cycle(a, &[c, b]));
    }

    #[test]
    fn create_payload_defaults() {
        let input: CreatePage = serde_json::from_value(serde_json::json!({
            "slug": "about",
            "translations": [{ "language": "en", "title": "About" }]
        }))
        .unwrap();
        assert!(input.status.is_none());
        assert_eq!(input.sort_order, 0);
        assert_eq!(input.translations[0].summary, None);
    }
}
