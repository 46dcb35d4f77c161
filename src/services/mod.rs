pub mod billing;
pub mod contact;
pub mod domains;
pub mod media;
pub mod menus;
pub mod offerings;
pub mod pages;
pub mod references;
pub mod seo;
pub mod settings;
pub mod site;
pub mod social;
pub mod team;
pub mod tenants;
pub mod users;
pub mod validate;

use serde::{Deserialize, Deserializer};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::database::{DatabaseError, Translation, TranslationRepository, TranslationTable};
use crate::jobs::JobError;

/// Errors raised by the business layer. Converted to `ApiError` at the
/// handler boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("plan limit reached: {0}")]
    PlanLimit(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ServiceError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(err.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in update payloads. Use with `#[serde(default)]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Records that carry an embedded translation set
pub(crate) trait Translated {
    fn id(&self) -> Uuid;
    fn set_translations(&mut self, translations: Vec<Translation>);
}

/// Fill in the translations of every item with one query
pub(crate) async fn attach_translations<T: Translated>(
    pool: &PgPool,
    table: TranslationTable,
    items: &mut [T],
) -> ServiceResult<()> {
    let ids: Vec<Uuid> = items.iter().map(|item| item.id()).collect();
    let mut grouped = TranslationRepository::load(pool, table, &ids).await?;
    for item in items.iter_mut() {
        let translations = grouped.remove(&item.id()).unwrap_or_default();
        item.set_translations(translations);
    }
    Ok(())
}
