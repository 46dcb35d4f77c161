// handlers/elevated/root/system.rs - GET /api/root/system

use axum::extract::State;
use serde::Serialize;

use crate::app::AppState;
use crate::config::Environment;
use crate::jobs::JobSnapshot;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub version: String,
    pub build_version: &'static str,
    pub environment: Environment,
    pub running_jobs: Vec<JobSnapshot>,
}

/// Installed version (as recorded by the last update) and running jobs
pub async fn system_info(State(state): State<AppState>) -> ApiResult<SystemInfo> {
    let version = state.updates().current_version().await?;
    Ok(ApiResponse::success(SystemInfo {
        version,
        build_version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment,
        running_jobs: state.registry().running().await,
    }))
}
