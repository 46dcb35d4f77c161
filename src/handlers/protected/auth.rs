// handlers/protected/auth.rs - GET /api/auth/whoami, PUT /api/auth/password

use axum::{extract::State, Extension, Json};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::users::{ChangePassword, User, UserService};

/// GET /api/auth/whoami - The account behind the token
pub async fn whoami(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<User> {
    let account = UserService::new(state.pool.clone()).find_by_id(user.user_id).await?;
    Ok(ApiResponse::success(account))
}

/**
 * PUT /api/auth/password - Change own password
 *
 * ```json
 * { "current_password": "...", "new_password": "at least 8 characters" }
 * ```
 */
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<ChangePassword>,
) -> ApiResult<()> {
    UserService::new(state.pool.clone()).change_password(user.user_id, &input).await?;
    tracing::info!(user_id = %user.user_id, "Password changed");
    Ok(ApiResponse::no_content())
}
