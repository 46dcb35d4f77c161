use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

use super::{validate, ServiceError, ServiceResult};
use crate::tenancy::TenantContext;

/// The tenant's single contact record
#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub opening_hours: Value,
    pub updated_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "email, phone, address_line1, address_line2, city, postal_code, country, \
     latitude, longitude, opening_hours, updated_at";

/// Full replacement of the contact record
#[derive(Debug, Default, Deserialize)]
pub struct ContactInput {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Free-form, e.g. `{"mon": "9-17"}`
    pub opening_hours: Option<Value>,
}

impl ContactInput {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(email) = &self.email {
            validate::email("email", email)?;
        }
        if let Some(country) = &self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(ServiceError::validation("country", "must be an ISO 3166-1 alpha-2 code"));
            }
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(ServiceError::validation(
                "latitude",
                "latitude and longitude must be given together",
            ));
        }
        if self.latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
            return Err(ServiceError::validation("latitude", "must be between -90 and 90"));
        }
        if self.longitude.is_some_and(|lon| !(-180.0..=180.0).contains(&lon)) {
            return Err(ServiceError::validation("longitude", "must be between -180 and 180"));
        }
        if self.opening_hours.as_ref().is_some_and(|v| !v.is_object()) {
            return Err(ServiceError::validation("opening_hours", "must be an object"));
        }
        Ok(())
    }
}

pub struct ContactService {
    pool: PgPool,
}

impl ContactService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// An empty record when none was saved yet
    pub async fn get(&self, tenant: &TenantContext) -> ServiceResult<ContactInfo> {
        let sql = format!("SELECT {} FROM contact_infos WHERE tenant_id = $1", COLUMNS);
        let info: Option<ContactInfo> = sqlx::query_as(&sql).bind(tenant.id).fetch_optional(&self.pool).await?;
        Ok(info.unwrap_or_else(|| ContactInfo {
            opening_hours: Value::Object(Default::default()),
            ..Default::default()
        }))
    }

    pub async fn upsert(&self, tenant: &TenantContext, input: ContactInput) -> ServiceResult<ContactInfo> {
        input.validate()?;
        let opening_hours = input.opening_hours.unwrap_or_else(|| Value::Object(Default::default()));
        let sql = format!(
            r#"
            INSERT INTO contact_infos (tenant_id, email, phone, address_line1, address_line2, city,
                postal_code, country, latitude, longitude, opening_hours)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (tenant_id) DO UPDATE SET
                email = EXCLUDED.email, phone = EXCLUDED.phone,
                address_line1 = EXCLUDED.address_line1, address_line2 = EXCLUDED.address_line2,
                city = EXCLUDED.city, postal_code = EXCLUDED.postal_code, country = EXCLUDED.country,
                latitude = EXCLUDED.latitude, longitude = EXCLUDED.longitude,
                opening_hours = EXCLUDED.opening_hours, updated_at = now()
            RETURNING {}
            "#,
            COLUMNS
        );
        let info: ContactInfo = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.address_line1)
            .bind(&input.address_line2)
            .bind(&input.city)
            .bind(&input.postal_code)
            .bind(&input.country)
            .bind(input.latitude)
            .bind(input.longitude)
            .bind(&opening_hours)
            .fetch_one(&self.pool)
            .await?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_come_in_pairs() {
        let input = ContactInput {
            latitude: Some(52.5),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = ContactInput {
            latitude: Some(52.5),
            longitude: Some(13.4),
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        let input = ContactInput {
            latitude: Some(91.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn country_and_hours_shape() {
        let input = ContactInput {
            country: Some("de".to_string()),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = ContactInput {
            opening_hours: Some(serde_json::json!(["mon"])),
            ..Default::default()
        };
        assert!(input.validate().is_err());

        let input = ContactInput {
            country: Some("DE".to_string()),
            opening_hours: Some(serde_json::json!({"mon": "9-17"})),
            ..Default::default()
        };
        assert!(input.validate().is_ok());
    }
}
