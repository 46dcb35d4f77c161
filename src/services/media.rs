use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::billing::{BillingService, Quota};
use super::{nullable, ServiceError, ServiceResult};
use crate::config::MediaConfig;
use crate::database::{Paginated, Pagination};
use crate::tenancy::TenantContext;

const MAX_NAME_LENGTH: usize = 255;
const MAX_EXTENSION_LENGTH: usize = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MediaAsset {
    pub id: Uuid,
    pub file_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub url: String,
}

const COLUMNS: &str =
    "id, file_name, original_name, mime_type, size_bytes, storage_path, alt_text, uploaded_by, created_at, updated_at";

/// A file received from a multipart upload
#[derive(Debug)]
pub struct UploadedFile {
    pub original_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMedia {
    #[serde(default, deserialize_with = "nullable")]
    pub alt_text: Option<Option<String>>,
}

pub struct MediaService {
    pool: PgPool,
    config: MediaConfig,
}

impl MediaService {
    pub fn new(pool: PgPool, config: MediaConfig) -> Self {
        Self { pool, config }
    }

    pub async fn list(&self, tenant: &TenantContext, pagination: Pagination) -> ServiceResult<Paginated<MediaAsset>> {
        let sql = format!(
            "SELECT {} FROM media_assets WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            COLUMNS
        );
        let assets: Vec<MediaAsset> = sqlx::query_as(&sql)
            .bind(tenant.id)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_assets WHERE tenant_id = $1")
            .bind(tenant.id)
            .fetch_one(&self.pool)
            .await?;
        let assets = assets.into_iter().map(|a| self.with_url(a)).collect();
        Ok(Paginated::new(assets, pagination, total))
    }

    pub async fn get(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<MediaAsset> {
        let sql = format!("SELECT {} FROM media_assets WHERE id = $1 AND tenant_id = $2", COLUMNS);
        let asset: MediaAsset = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Media"))?;
        Ok(self.with_url(asset))
    }

    /// Validate, store on disk and record an upload
    pub async fn upload(
        &self,
        tenant: &TenantContext,
        uploaded_by: Option<Uuid>,
        file: UploadedFile,
        alt_text: Option<String>,
    ) -> ServiceResult<MediaAsset> {
        let mime_type = normalize_mime(&file.content_type);
        if !self.config.allowed_mime_types.iter().any(|m| m.eq_ignore_ascii_case(&mime_type)) {
            return Err(ServiceError::UnsupportedMediaType(format!(
                "{} uploads are not allowed",
                mime_type
            )));
        }
        if file.data.is_empty() {
            return Err(ServiceError::validation("file", "file is empty"));
        }
        if file.data.len() > self.config.max_upload_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "file exceeds the {} byte upload limit",
                self.config.max_upload_bytes
            )));
        }
        let original_name = sanitize_name(&file.original_name);
        let extension = stored_extension(&original_name, &mime_type)?;

        let size = file.data.len() as i64;
        BillingService::new(self.pool.clone())
            .ensure_quota(tenant, Quota::MediaBytes(size))
            .await?;
        let id = Uuid::new_v4();
        let file_name = format!("{}.{}", id, extension);
        let storage_path = format!("{}/{}", tenant.id, file_name);
        let absolute = self.absolute_path(&storage_path);

        if let Some(dir) = absolute.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&absolute, &file.data).await?;

        let sql = format!(
            r#"
            INSERT INTO media_assets (id, tenant_id, file_name, original_name, mime_type, size_bytes, storage_path, alt_text, uploaded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            COLUMNS
        );
        let inserted: Result<MediaAsset, sqlx::Error> = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(&file_name)
            .bind(&original_name)
            .bind(&mime_type)
            .bind(size)
            .bind(&storage_path)
            .bind(alt_text.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .bind(uploaded_by)
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(asset) => {
                tracing::info!(tenant_id = %tenant.id, media_id = %id, size, "Stored upload {}", original_name);
                Ok(self.with_url(asset))
            }
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&absolute).await {
                    tracing::warn!("Could not remove orphaned upload {}: {}", absolute.display(), io);
                }
                Err(e.into())
            }
        }
    }

    pub async fn update(&self, tenant: &TenantContext, id: Uuid, input: UpdateMedia) -> ServiceResult<MediaAsset> {
        let sql = format!(
            r#"
            UPDATE media_assets SET
                alt_text = CASE WHEN $3 THEN $4 ELSE alt_text END,
                updated_at = now()
            WHERE id = $1 AND tenant_id = $2
            RETURNING {}
            "#,
            COLUMNS
        );
        let asset: MediaAsset = sqlx::query_as(&sql)
            .bind(id)
            .bind(tenant.id)
            .bind(input.alt_text.is_some())
            .bind(input.alt_text.flatten())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServiceError::NotFound("Media"))?;
        Ok(self.with_url(asset))
    }

    /// Delete the record, then the file. A file that is already gone is only
    /// logged.
    pub async fn delete(&self, tenant: &TenantContext, id: Uuid) -> ServiceResult<()> {
        let storage_path: Option<String> =
            sqlx::query_scalar("DELETE FROM media_assets WHERE id = $1 AND tenant_id = $2 RETURNING storage_path")
                .bind(id)
                .bind(tenant.id)
                .fetch_optional(&self.pool)
                .await?;
        let storage_path = storage_path.ok_or(ServiceError::NotFound("Media"))?;

        let absolute = self.absolute_path(&storage_path);
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(media_id = %id, "Media file {} was already missing", absolute.display());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn absolute_path(&self, storage_path: &str) -> PathBuf {
        self.config.storage_root.join(storage_path)
    }

    fn with_url(&self, mut asset: MediaAsset) -> MediaAsset {
        asset.url = public_url(&self.config.public_base_url, &asset.storage_path);
        asset
    }
}

/// Referenced media must belong to the same tenant
pub async fn ensure_tenant_media(
    pool: &PgPool,
    tenant: &TenantContext,
    media_id: Uuid,
    field: &'static str,
) -> ServiceResult<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM media_assets WHERE id = $1 AND tenant_id = $2)")
            .bind(media_id)
            .bind(tenant.id)
            .fetch_one(pool)
            .await?;
    if !exists {
        return Err(ServiceError::validation(field, "media does not exist"));
    }
    Ok(())
}

pub fn public_url(base: &str, storage_path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), storage_path)
}

/// `image/PNG; charset=x` -> `image/png`
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Keep only the final path component of a client-supplied name
pub fn sanitize_name(name: &str) -> String {
    let base = Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let base = base.rsplit('\\').next().unwrap_or_default();
    let cleaned: String = base.chars().filter(|c| !c.is_control()).take(MAX_NAME_LENGTH).collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Lowercase alphanumeric extension, if the name has a usable one
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LENGTH {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Extension for the file written to disk. It follows the checked MIME type,
/// never the client's name, since `/media` serves files by extension. A name
/// whose extension belongs to another type is rejected; types without a known
/// extension are stored as `.bin`.
pub fn stored_extension(original_name: &str, mime: &str) -> ServiceResult<&'static str> {
    let Some(canonical) = extension_for_mime(mime) else {
        return Ok("bin");
    };
    match file_extension(original_name) {
        Some(ext) if mime_for_extension(&ext) != Some(mime) => Err(ServiceError::UnsupportedMediaType(format!(
            "a .{} file cannot be uploaded as {}",
            ext, mime
        ))),
        _ => Ok(canonical),
    }
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "pdf" => Some("application/pdf"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "application/pdf" => Some("pdf"),
        "video/mp4" => Some("mp4"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_lose_their_directories() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("C:\\Users\\me\\photo.JPG"), "photo.JPG");
        assert_eq!(sanitize_name("  logo.png "), "logo.png");
        assert_eq!(sanitize_name(""), "upload");
        assert_eq!(sanitize_name("/"), "upload");
    }

    #[test]
    fn extensions_are_sanitised() {
        assert_eq!(file_extension("photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension(".htaccess"), None);
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("evil.ph p"), None);
        assert_eq!(file_extension("x.averyverylongext"), None);
    }

    #[test]
    fn mime_types_normalised() {
        assert_eq!(normalize_mime("Image/PNG; charset=binary"), "image/png");
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("text/html"), None);
    }

    #[test]
    fn stored_extension_follows_mime_type() {
        assert_eq!(stored_extension("photo.JPEG", "image/jpeg").unwrap(), "jpg");
        assert_eq!(stored_extension("logo.png", "image/png").unwrap(), "png");
        assert_eq!(stored_extension("upload", "image/png").unwrap(), "png");
        assert_eq!(stored_extension("evil.ph p", "image/png").unwrap(), "png");
        assert_eq!(stored_extension("clip.mov", "video/quicktime").unwrap(), "bin");
    }

    #[test]
    fn mismatched_extension_is_rejected() {
        let err = stored_extension("avatar.html", "image/png").unwrap_err();
        assert!(matches!(err, ServiceError::UnsupportedMediaType(_)));
        assert!(stored_extension("photo.png", "image/jpeg").is_err());
        assert!(stored_extension("doc.svg", "application/pdf").is_err());
    }

    #[tokio::test]
    async fn html_named_png_is_not_stored() {
        let root = std::env::temp_dir().join(format!("cms-media-{}", Uuid::new_v4()));
        let config = MediaConfig {
            storage_root: root.clone(),
            max_upload_bytes: 1024,
            allowed_mime_types: vec!["image/png".to_string()],
            public_base_url: "/media".to_string(),
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://cms@127.0.0.1:1/none")
            .unwrap();
        let tenant = TenantContext {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            name: "Acme".to_string(),
            default_language: "en".to_string(),
            languages: vec!["en".to_string()],
            plan_id: None,
        };
        let file = UploadedFile {
            original_name: "avatar.html".to_string(),
            content_type: "image/png".to_string(),
            data: b"<script>alert(1)</script>".to_vec(),
        };

        let result = MediaService::new(pool, config).upload(&tenant, None, file, None).await;

        assert!(matches!(result, Err(ServiceError::UnsupportedMediaType(_))));
        assert!(!root.exists());
    }

    #[test]
    fn urls_join_cleanly() {
        assert_eq!(public_url("/media/", "t/x.png"), "/media/t/x.png");
        assert_eq!(public_url("https://cdn.example/media", "t/x.png"), "https://cdn.example/media/t/x.png");
    }
}
