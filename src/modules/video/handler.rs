use super::dto::{ProcessVideoRequest, UpdateStatusRequest};
use super::model::Video;
use super::service::VideoService;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

/// List videos waiting for conversion parameters
#[utoipa::path(
    get,
    path = "/api/videos/unprocessed",
    responses(
        (status = 200, description = "Unprocessed videos", body = Vec<Video>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Videos"
)]
pub async fn list_unprocessed(
    State(state): State<AppState>,
) -> Result<Json<Vec<Video>>, ApiError> {
    let videos = VideoService::list_unprocessed(state).await?;
    Ok(Json(videos))
}

/// Submit a video for conversion
#[utoipa::path(
    post,
    path = "/api/videos/process",
    request_body = ProcessVideoRequest,
    responses(
        (status = 200, description = "Video queued", body = Video),
        (status = 400, description = "Malformed request"),
        (status = 404, description = "Video not found"),
        (status = 409, description = "Video already queued or converted")
    ),
    tag = "Videos"
)]
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<ProcessVideoRequest>, JsonRejection>,
) -> Result<Json<Video>, ApiError> {
    let Json(req) = payload?;
    let video = VideoService::process(state, req).await?;
    Ok(Json(video))
}

/// Get a single video
#[utoipa::path(
    get,
    path = "/api/videos/{id}",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video details", body = ApiResponse<Video>),
        (status = 404, description = "Video not found")
    ),
    tag = "Videos"
)]
pub async fn get_video(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match VideoService::find_by_id(state, id).await {
        Ok(video) => ApiSuccess::ok(video, "Video retrieved successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Retry a failed conversion
#[utoipa::path(
    post,
    path = "/api/videos/{id}/retry",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video requeued", body = ApiResponse<Video>),
        (status = 404, description = "Video not found"),
        (status = 409, description = "Video is not failed")
    ),
    tag = "Videos"
)]
pub async fn retry_video(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match VideoService::retry(state, id).await {
        Ok(video) => ApiSuccess::ok(video, "Video requeued successfully").into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Change a video's status along a lifecycle edge
#[utoipa::path(
    patch,
    path = "/api/videos/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<Video>),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Video not found"),
        (status = 409, description = "Transition not allowed from the current status")
    ),
    tag = "Videos"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let video = VideoService::update_status(state, id, req).await?;
    Ok(ApiSuccess::ok(video, "Video status updated successfully"))
}
