// handlers/protected/media.rs - /api/media

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Role;
use crate::database::{Paginated, Pagination};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::media::{MediaAsset, UpdateMedia, UploadedFile};
use crate::tenancy::TenantContext;

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<MediaAsset>> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(state.media().list(&tenant, pagination).await?))
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<MediaAsset> {
    user.require(Role::Viewer)?;
    Ok(ApiResponse::success(state.media().get(&tenant, id).await?))
}

/**
 * POST /api/media - Multipart upload
 *
 * Fields: `file` (required), `alt_text` (optional). The mime type must be in
 * the configured allow-list (415) and the file within `max_upload_bytes`
 * (413). The plan's storage quota is enforced (403).
 */
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    mut multipart: Multipart,
) -> ApiResult<MediaAsset> {
    user.require(Role::Editor)?;

    let mut file = None;
    let mut alt_text = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let original_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some(UploadedFile {
                    original_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            Some("alt_text") => {
                let text = field.text().await.map_err(multipart_error)?;
                alt_text = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| ApiError::field_error("file", "multipart field is required"))?;
    let asset = state
        .media()
        .upload(&tenant, Some(user.user_id), file, alt_text)
        .await?;
    tracing::info!(tenant = %tenant.slug, media_id = %asset.id, bytes = asset.size_bytes, "Stored upload");
    Ok(ApiResponse::created(asset))
}

/// PUT /api/media/:id - `{ "alt_text": "..." }`, null clears it
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateMedia>,
) -> ApiResult<MediaAsset> {
    user.require(Role::Editor)?;
    Ok(ApiResponse::success(state.media().update(&tenant, id, input).await?))
}

/// DELETE /api/media/:id - Removes the record and the stored file
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    user.require(Role::Editor)?;
    state.media().delete(&tenant, id).await?;
    Ok(ApiResponse::no_content())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the maximum size")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}
