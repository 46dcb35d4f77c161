// handlers/elevated/root/operation.rs - /api/root/operations

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::{Paginated, Pagination};
use crate::jobs::{JobKind, JobSnapshot, Operation};
use crate::middleware::{ApiResponse, ApiResult};

/// Persisted state plus live progress while the job runs in this process
#[derive(Debug, Serialize)]
pub struct OperationView {
    #[serde(flatten)]
    pub operation: Operation,
    pub live: Option<JobSnapshot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OperationQuery {
    pub kind: Option<JobKind>,
}

/// GET /api/root/operations?kind=backup
pub async fn operation_list(
    State(state): State<AppState>,
    Query(query): Query<OperationQuery>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Paginated<Operation>> {
    Ok(ApiResponse::success(state.ops.store.list(query.kind, pagination).await?))
}

/// GET /api/root/operations/:id
pub async fn operation_show(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<OperationView> {
    let operation = state.ops.store.get(id).await?;
    let live = state.registry().snapshot(id).await;
    Ok(ApiResponse::success(OperationView { operation, live }))
}
