use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::billing::{BillingService, Quota};
use super::media::ensure_tenant_media;
use super::{attach_translations, nullable, validate, ServiceError, ServiceResult, Translated};
use crate::database::{Paginated, Pagination, Translation, TranslationRepository, TranslationTable};
use crate::tenancy::TenantContext;

/// Team member; the translated title is the person's role or position
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub photo_media_id: Option<Uuid>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub translations: Vec<Translation>,
}

impl Translated for TeamMember {
    fn id(&self) -> Uuid {
        self.id
    }

    fn set_translations(&mut self, translations: Vec<Translation>) {
        self.translations = translations;
    }
}

const COLUMNS: &str = "id, name, email, photo_media_id, sort_order, is_active, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateTeamMember {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_media_id: Option<Uuid>,
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
pub struct UpdateTeamMember {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub photo_media_id: Option<Option<Uuid>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub translations: Option<Vec<Translation>>,
}

pub struct TeamService {
    pool: PgPool,
}

impl TeamService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant: &TenantContext, pagination: Pagination) -> ServiceResult<Paginated<TeamMember>> {
        let sql = format!(
            "SELECT {} FROM team_members WHERE tenant_id = $1 ORDER BY sort_order, created_at LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let mut members: Vec<TeamMember> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM team_members WHERE tenant_id = $1")
            .bind(tenant.id)
            .fetch_one(&self.pool)
            .await?;
        attach_translations(&self.pool, TranslationTable::TeamMember, &mut members).await?;
        Ok(Paginated::new(members, pagination, total))
    }

    pub async fn list_active(&self, tenant: &TenantContext) -> ServiceResult<Vec<TeamMember>> {
        let sql = format!(
            "SELECT {} FROM team_members WHERE tenant_id = $1 AND is_active ORDER BY sort_order, created_at",
            COLUMNS
        );
        let mut members: Vec<TeamMember> = sqlx::query_as(&sql).bind(tenant.id).fetch_all(&self.pool).await?;
        attach_translations(&self.pool, TranslationTable::TeamMember, &mut members).await?;
        Ok(members)
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<TeamMember> {
        let sql = format!("SELECT {} FROM team_members WHERE id = $1 AND tenant_id = $2", COLUMNS);
        let mut member: TeamMember = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Team member"))?;
        member.translations = TranslationRepository::load_one(&self.pool, TranslationTable::TeamMember, id).await?;
        Ok(member)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreateTeamMember) -> ServiceResult<TeamMember> {
        validate::not_blank("name", &input.name)?;
        if let Some(email) = &input.email {
            validate::email("email", email)?;
        }
        validate::translations(tenant, &input.translations, true)?;
        if let Some(media_id) = input.photo_media_id {
            ensure_tenant_media(&self.pool, tenant, media_id, "photo_media_id").await?;
        }
        BillingService::new(self.pool.clone())
            .ensure_quota(tenant, Quota::TeamMembers)
            .await?;

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO team_members (tenant_id, name, email, photo_media_id, sort_order, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            COLUMNS
        );
        let mut member: TeamMember = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(input.name.trim())
            .bind(&input.email)
            .bind(input.photo_media_id)
            .bind(input.sort_order)
            .bind(input.is_active)
            .fetch_one(&mut *tx)
            .await?;
        TranslationRepository::replace(&mut tx, TranslationTable::TeamMember, member.id, &input.translations).await?;
        tx.commit().await?;

        member.translations = input.translations;
        Ok(member)
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdateTeamMember) -> ServiceResult<TeamMember> {
        if let Some(name) = &input.name {
            validate::not_blank("name", name)?;
        }
        if let Some(Some(email)) = &input.email {
            validate::email("email", email)?;
        }
        if let Some(Some(media_id)) = input.photo_media_id {
            ensure_tenant_media(&self.pool, tenant, media_id, "photo_media_id").await?;
        }
        if let Some(translations) = &input.translations {
            validate::translations(tenant, translations, false)?;
        }

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE team_members SET
                name = COALESCE($3, name),
                email = CASE WHEN $4 THEN $5 ELSE email END,
                photo_media_id = CASE WHEN $6 THEN $7 ELSE photo_media_id END,
                sort_order = COALESCE($8, sort_order),
                is_active = COALESCE($9, is_active),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        let mut member: TeamMember = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(input.name.as_deref().map(str::trim))
            .bind(input.email.is_some())
            .bind(input.email.clone().flatten())
            .bind(input.photo_media_id.is_some())
            .bind(input.photo_media_id.flatten())
            .bind(input.sort_order)
            .bind(input.is_active)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ServiceError::NotFound("Team member"))?;
        if let Some(translations) = &input.translations {
            TranslationRepository::replace(&mut tx, TranslationTable::TeamMember, id, translations).await?;
        }
        tx.commit().await?;

        member.translations = match input.translations {
            Some(translations) => translations,
            None => TranslationRepository::load_one(&self.pool, TranslationTable::TeamMember, id).await?,
        };
        Ok(member)
    }

    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let result = sqlx::query("DELETE FROM team_members WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Team member"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_optional_fields() {
        let input: UpdateTeamMember = serde_json::from_str(r#"{"email": null, "sort_order": 3}"#).unwrap();
        assert_eq!(input.email, Some(None));
        assert_eq!(input.photo_media_id, None);
        assert_eq!(input.sort_order, Some(3));
    }
}
