use super::dto::{QueueQuery, QueueResponse};
use super::service::QueueService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::infrastructure::store::StatusCounts;
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};

/// Paginated queue view
#[utoipa::path(
    get,
    path = "/api/queue",
    params(QueueQuery),
    responses(
        (status = 200, description = "One page of the queue", body = QueueResponse),
        (status = 400, description = "Unknown status filter or malformed paging")
    ),
    tag = "Queue"
)]
pub async fn get_queue(
    State(state): State<AppState>,
    query: Result<Query<QueueQuery>, QueryRejection>,
) -> Result<Json<QueueResponse>, ApiError> {
    let Query(query) = query?;
    let response = QueueService::page(state.store.as_ref(), query).await?;
    Ok(Json(response))
}

/// Job counts per status
#[utoipa::path(
    get,
    path = "/api/queue/stats",
    responses(
        (status = 200, description = "Counts per status", body = ApiResponse<StatusCounts>)
    ),
    tag = "Queue"
)]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match QueueService::stats(state.store.as_ref()).await {
        Ok(counts) => ApiSuccess::ok(counts, "Queue statistics retrieved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
