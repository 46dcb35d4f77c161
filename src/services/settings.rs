use serde_json::Value;
use sqlx::PgExecutor;

use crate::database::DatabaseError;

pub const VERSION_KEY: &str = "version";

/// System-wide key/value settings (`system_settings`)
pub struct SettingsRepository;

impl SettingsRepository {
    pub async fn get<'e, E: PgExecutor<'e>>(executor: E, key: &str) -> Result<Option<Value>, DatabaseError> {
        let value: Option<Value> = sqlx::query_scalar("SELECT value FROM system_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(executor)
            .await?;
        Ok(value)
    }

    pub async fn put<'e, E: PgExecutor<'e>>(executor: E, key: &str, value: &Value) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Version recorded by the last successful update, if any
    pub async fn installed_version<'e, E: PgExecutor<'e>>(executor: E) -> Result<Option<String>, DatabaseError> {
        Ok(Self::get(executor, VERSION_KEY)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub async fn set_installed_version<'e, E: PgExecutor<'e>>(executor: E, version: &str) -> Result<(), DatabaseError> {
        Self::put(executor, VERSION_KEY, &Value::String(version.to_string())).await
    }
}
