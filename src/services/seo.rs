use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::media::ensure_tenant_media;
use super::{validate, ServiceError, ServiceResult};
use crate::tenancy::TenantContext;

const MAX_PATH_LENGTH: usize = 512;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SeoEntry {
    pub id: Uuid,
    pub path: String,
    pub language: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub og_image_media_id: Option<Uuid>,
    pub canonical_url: Option<String>,
    pub no_index: bool,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str =
    "id, path, language, title, description, keywords, og_image_media_id, canonical_url, no_index, updated_at";

/// Upsert payload; `(path, language)` identifies the entry
#[derive(Debug, Deserialize)]
pub struct SeoInput {
    pub path: String,
    pub language: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub og_image_media_id: Option<Uuid>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub no_index: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeoFilter {
    pub path: Option<String>,
    pub language: Option<String>,
}

/// Site paths are absolute, without query or fragment
pub fn seo_path(value: &str) -> ServiceResult<()> {
    let valid = value.starts_with('/')
        && value.len() <= MAX_PATH_LENGTH
        && !value.contains(['?', '#'])
        && !value.chars().any(char::is_whitespace);
    if !valid {
        return Err(ServiceError::validation(
            "path",
            "must start with '/' and contain no query, fragment or whitespace",
        ));
    }
    Ok(())
}

pub struct SeoService {
    pool: PgPool,
}

impl SeoService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant: &TenantContext, filter: &SeoFilter) -> ServiceResult<Vec<SeoEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM seo_entries
            WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR path = $2) AND ($3::TEXT IS NULL OR language = $3)
            ORDER BY path, language
            "#,
            COLUMNS
        );
        Ok(sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&filter.path)
            .bind(&filter.language)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Entry for a path in the requested language, else the tenant default
    pub async fn find(&self, tenant: &TenantContext, path: &str, language: Option<&str>) -> ServiceResult<SeoEntry> {
        let sql = format!(
            r#"
            SELECT {} FROM seo_entries
            WHERE tenant_id = $1 AND path = $2 AND language IN ($3, $4)
            ORDER BY (language = $3) DESC
            LIMIT 1
            "#,
            COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(path)
            .bind(language.unwrap_or(&tenant.default_language))
            .bind(&tenant.default_language)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("SEO entry"))
    }

    pub async fn upsert(&self, tenant: &TenantContext, input: SeoInput) -> ServiceResult<SeoEntry> {
        seo_path(&input.path)?;
        if !tenant.has_language(&input.language) {
            return Err(ServiceError::validation(
                "language",
                format!("language '{}' is not enabled for this site", input.language),
            ));
        }
        if let Some(url) = &input.canonical_url {
            validate::http_url("canonical_url", url)?;
        }
        if let Some(media_id) = input.og_image_media_id {
            ensure_tenant_media(&self.pool, tenant, media_id, "og_image_media_id").await?;
        }
        let keywords: Vec<String> = input
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let sql = format!(
            r#"
            INSERT INTO seo_entries (tenant_id, path, language, title, description, keywords,
                og_image_media_id, canonical_url, no_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, path, language) DO UPDATE SET
                title = EXCLUDED.title, description = EXCLUDED.description, keywords = EXCLUDED.keywords,
                og_image_media_id = EXCLUDED.og_image_media_id, canonical_url = EXCLUDED.canonical_url,
                no_index = EXCLUDED.no_index, updated_at = now()
            RETURNING {}
            "#,
            COLUMNS
        );
        let entry: SeoEntry = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.path)
            .bind(&input.language)
            .bind(&input.title)
            .bind(&input.description)
            .bind(&keywords)
            .bind(input.og_image_media_id)
            .bind(&input.canonical_url)
            .bind(input.no_index)
            .fetch_one(&self.pool)
            .await?;
        Ok(entry)
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM seo_entries WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("SEO entry"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_site_absolute() {
        assert!(seo_path("/").is_ok());
        assert!(seo_path("/about/team").is_ok());
        assert!(seo_path("about").is_err());
        assert!(seo_path("/search?q=x").is_err());
        assert!(seo_path("/a b").is_err());
    }
}
