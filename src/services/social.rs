use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{validate, ServiceError, ServiceResult};
use crate::tenancy::TenantContext;

pub const PLATFORMS: [&str; 8] = ["facebook", "instagram", "linkedin", "x", "youtube", "tiktok", "github", "other"];

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SocialLink {
    pub id: Uuid,
    pub platform: String,
    pub url: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, platform, url, sort_order, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateSocialLink {
    pub platform: String,
    pub url: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSocialLink {
    pub platform: Option<String>,
    pub url: Option<String>,
    pub sort_order: Option<i32>,
}

pub fn platform(value: &str) -> ServiceResult<()> {
    if !PLATFORMS.contains(&value) {
        return Err(ServiceError::validation(
            "platform",
            format!("must be one of {}", PLATFORMS.join(", ")),
        ));
    }
    Ok(())
}

pub struct SocialService {
    pool: PgPool,
}

impl SocialService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant: &TenantContext) -> ServiceResult<Vec<SocialLink>> {
        let sql = format!(
            "SELECT {} FROM social_links WHERE tenant_id = $1 ORDER BY sort_order, platform",
            COLUMNS
        );
        Ok(sqlx::query_as(&sql).bind(tenant.id).fetch_all(&self.pool).await?)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreateSocialLink) -> ServiceResult<SocialLink> {
        platform(&input.platform)?;
        validate::http_url("url", &input.url)?;
        let sql = format!(
            "INSERT INTO social_links (tenant_id, platform, url, sort_order) VALUES ($1, $2, $3, $4) RETURNING {}",
            COLUMNS
        );
        let link: SocialLink = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.platform)
            .bind(&input.url)
            .bind(input.sort_order)
            .fetch_one(&self.pool)
            .await?;
        Ok(link)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdateSocialLink) -> ServiceResult<SocialLink> {
        if let Some(p) = &input.platform {
            platform(p)?;
        }
        if let Some(url) = &input.url {
            validate::http_url("url", url)?;
        }
        let sql = format!(
            r#"
            UPDATE social_links SET
                platform = COALESCE($3, platform),
                url = COALESCE($4, url),
                sort_order = COALESCE($5, sort_order),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&input.platform)
            .bind(&input.url)
            .bind(input.sort_order)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Social link"))
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM social_links WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Social link"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platforms_are_a_fixed_set() {
        assert!(platform("github").is_ok());
        assert!(platform("x").is_ok());
        assert!(platform("myspace").is_err());
        assert!(platform("GitHub").is_err());
    }
}
