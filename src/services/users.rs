use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use super::{validate, ServiceError, ServiceResult};
use crate::auth::{hash_password, verify_password, AuthError, JwtKeys, Role};
use crate::database::{Paginated, Pagination};
use crate::tenancy::TenantContext;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    tenant_id: Option<Uuid>,
    email: String,
    password_hash: String,
    display_name: String,
    role: String,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(ServiceError::BadRequest)?;
        Ok(User {
            id: row.id,
            tenant_id: row.tenant_id,
            email: row.email,
            display_name: row.display_name,
            role,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, tenant_id, email, password_hash, display_name, role, is_active, last_login_at, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUser {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Admin password reset
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Tenant slug; omitted by super admins
    #[serde(default)]
    pub tenant: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePassword {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: User,
}

/// Roles a tenant admin may hand out
pub fn assignable_role(role: Role) -> ServiceResult<()> {
    if role == Role::SuperAdmin {
        return Err(ServiceError::Forbidden(
            "super_admin cannot be granted through the tenant API".to_string(),
        ));
    }
    Ok(())
}

/// Guards against an admin locking themselves out
pub fn check_self_update(actor_id: Uuid, target: &User, update: &UpdateUser) -> ServiceResult<()> {
    if actor_id != target.id {
        return Ok(());
    }
    if update.role.is_some_and(|role| role < target.role) {
        return Err(ServiceError::Forbidden("you cannot demote yourself".to_string()));
    }
    if update.is_active == Some(false) {
        return Err(ServiceError::Forbidden("you cannot deactivate yourself".to_string()));
    }
    Ok(())
}

pub struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, tenant: &TenantContext, pagination: Pagination) -> ServiceResult<Paginated<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE tenant_id = $1 ORDER BY lower(email) LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE tenant_id = $1")
            .bind(tenant.id)
            .fetch_one(&self.pool)
            .await?;
        let users = rows.into_iter().map(User::try_from).collect::<ServiceResult<Vec<_>>>()?;
        Ok(Paginated::new(users, pagination, total))
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<User> {
        let sql = format!("SELECT {} FROM users WHERE id = $1 AND tenant_id = $2", COLUMNS);
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        User::try_from(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> ServiceResult<User> {
        let row = self.row_by_id(id).await?.ok_or(ServiceError::NotFound("User"))?;
        User::try_from(row)
    }

    pub async fn create(&self, tenant: &TenantContext, input: CreateUser) -> ServiceResult<User> {
        assignable_role(input.role)?;
        insert_user(&self.pool, Some(tenant.id), &input).await
    }

    /// Platform operator account, not bound to a tenant
    pub async fn create_super_admin(&self, email: &str, password: &str, display_name: &str) -> ServiceResult<User> {
        let input = CreateUser {
            email: email.to_string(),
            password: password.to_string(),
            display_name: display_name.to_string(),
            role: Role::SuperAdmin,
        };
        insert_user(&self.pool, None, &input).await
    }

    pub async fn update(&self, tenant: &TenantContext, actor_id: Uuid, id: Uuid, input: UpdateUser) -> ServiceResult<User> {
        let target = self.get(tenant, id).await?;
        if let Some(role) = input.role {
            assignable_role(role)?;
        }
        check_self_update(actor_id, &target, &input)?;
        if let Some(name) = &input.display_name {
            validate::not_blank("display_name", name)?;
        }
        let password_hash = input.password.as_deref().map(hash_password).transpose()?;

        let sql = format!(
            r#"
            UPDATE users SET
                display_name = COALESCE($3, display_name),
                role = COALESCE($4, role),
                is_active = COALESCE($5, is_active),
                password_hash = COALESCE($6, password_hash),
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(input.display_name.as_deref().map(str::trim))
            .bind(input.role.map(|r| r.as_str()))
            .bind(input.is_active)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        User::try_from(row)
    }

    pub async fn delete(&self, tenant: &TenantContext, actor_id: Uuid, id: Uuid) -> ServiceResult<()> {
        if actor_id == id {
            return Err(ServiceError::Forbidden("you cannot delete yourself".to_string()));
        }
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User"));
        }
        Ok(())
    }

    /// Check credentials and issue a token. Unknown tenants, unknown users and
    /// wrong passwords all fail the same way.
    pub async fn login(&self, keys: &JwtKeys, request: &LoginRequest) -> ServiceResult<LoginResponse> {
        let tenant = match request.tenant.as_deref() {
            Some(slug) => Some(
                TenantContext::load_by_slug(&self.pool, slug)
                    .await?
                    .ok_or(AuthError::InvalidCredentials)?,
            ),
            None => None,
        };

        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE lower(email) = lower($1) AND tenant_id IS NOT DISTINCT FROM $2
            "#,
            COLUMNS
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(request.email.trim())
            .bind(tenant.as_ref().map(|t| t.id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&request.password, &row.password_hash) {
            return Err(AuthError::InvalidCredentials.into());
        }
        if !row.is_active {
            return Err(AuthError::Inactive.into());
        }

        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(row.id)
            .execute(&self.pool)
            .await?;

        let user = User::try_from(row)?;
        let token = keys.issue(user.id, user.tenant_id, tenant.map(|t| t.slug), user.role)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse {
            token,
            expires_in: keys.expiry_hours() * 3600,
            user,
        })
    }

    /// Reissue a token that is valid or expired within the grace window, as
    /// long as the user and its tenant are still active
    pub async fn refresh(&self, keys: &JwtKeys, token: &str, grace_hours: u64) -> ServiceResult<LoginResponse> {
        let claims = keys.decode_with_grace(token, grace_hours)?;
        let row = self.row_by_id(claims.sub).await?.ok_or(AuthError::InvalidCredentials)?;
        if !row.is_active {
            return Err(AuthError::Inactive.into());
        }
        let tenant = match row.tenant_id {
            Some(tenant_id) => Some(
                TenantContext::load_by_id(&self.pool, tenant_id)
                    .await?
                    .ok_or(AuthError::Inactive)?,
            ),
            None => None,
        };

        let user = User::try_from(row)?;
        let token = keys.issue(user.id, user.tenant_id, tenant.map(|t| t.slug), user.role)?;
        Ok(LoginResponse {
            token,
            expires_in: keys.expiry_hours() * 3600,
            user,
        })
    }

    pub async fn change_password(&self, user_id: Uuid, input: &ChangePassword) -> ServiceResult<()> {
        let row = self.row_by_id(user_id).await?.ok_or(ServiceError::NotFound("User"))?;
        if !verify_password(&input.current_password, &row.password_hash) {
            return Err(ServiceError::validation("current_password", "is incorrect"));
        }
        let hash = hash_password(&input.new_password)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        tracing::info!(%user_id, "Password changed");
        Ok(())
    }

    async fn row_by_id(&self, id: Uuid) -> ServiceResult<Option<UserRow>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", COLUMNS);
        Ok(sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?)
    }
}

/// Shared by the tenant API, tenant creation and the CLI
pub(crate) async fn insert_user<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: Option<Uuid>,
    input: &CreateUser,
) -> ServiceResult<User> {
    validate::email("email", input.email.trim())?;
    validate::not_blank("display_name", &input.display_name)?;
    let password_hash = hash_password(&input.password)?;

    let sql = format!(
        r#"
        INSERT INTO users (tenant_id, email, password_hash, display_name, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        COLUMNS
    );
    let row: UserRow = sqlx::query_as(&sql)
        .bind(tenant_id)
        .bind(input.email.trim().to_ascii_lowercase())
        .bind(password_hash)
        .bind(input.display_name.trim())
        .bind(input.role.as_str())
        .fetch_one(executor)
        .await
        .map_err(|e| match crate::database::map_sqlx_error(e) {
            crate::database::DatabaseError::Conflict(_) => {
                ServiceError::Conflict(format!("{} is already registered", input.email.trim()))
            }
            other => other.into(),
        })?;
    User::try_from(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            tenant_id: Some(Uuid::new_v4()),
            email: "admin@acme.test".to_string(),
            display_name: "Admin".to_string(),
            role,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn super_admin_not_assignable() {
        assert!(assignable_role(Role::Admin).is_ok());
        assert!(matches!(assignable_role(Role::SuperAdmin), Err(ServiceError::Forbidden(_))));
    }

    #[test]
    fn admins_cannot_lock_themselves_out() {
        let admin = user(Role::Admin);
        let demote = UpdateUser {
            role: Some(Role::Editor),
            ..Default::default()
        };
        assert!(check_self_update(admin.id, &admin, &demote).is_err());
        // Another admin may do it
        assert!(check_self_update(Uuid::new_v4(), &admin, &demote).is_ok());

        let deactivate = UpdateUser {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(check_self_update(admin.id, &admin, &deactivate).is_err());

        let rename = UpdateUser {
            display_name: Some("Boss".to_string()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(check_self_update(admin.id, &admin, &rename).is_ok());
    }

    #[test]
    fn login_tenant_is_optional() {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email": "root@cms.test", "password": "secret123"}"#).unwrap();
        assert!(request.tenant.is_none());
    }
}
