// handlers/public/auth.rs - POST /auth/login, POST /auth/refresh

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::users::{LoginRequest, LoginResponse, UserService};

/**
 * POST /auth/login - Exchange credentials for a JWT
 *
 * ```json
 * { "tenant": "acme", "email": "editor@acme.test", "password": "..." }
 * ```
 *
 * Super admins omit `tenant`. Unknown tenant, unknown email and wrong password
 * all answer the same 401 so accounts cannot be probed.
 */
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<LoginResponse> {
    let response = UserService::new(state.pool.clone()).login(&state.jwt, &request).await?;
    Ok(ApiResponse::success(response))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

/**
 * POST /auth/refresh - Reissue a token
 *
 * Accepts a token whose expiry passed less than `refresh_grace_hours` ago,
 * provided the user is still active.
 */
pub async fn refresh(State(state): State<AppState>, Json(request): Json<RefreshRequest>) -> ApiResult<LoginResponse> {
    let response = UserService::new(state.pool.clone())
        .refresh(&state.jwt, &request.token, state.config.security.refresh_grace_hours)
        .await?;
    Ok(ApiResponse::success(response))
}
