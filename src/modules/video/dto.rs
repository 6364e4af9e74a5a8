use super::model::{Bitrate, Resolution};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Body of `POST /api/videos/process`.
///
/// The console posts back the whole video object it received, with the chosen
/// parameters filled in; only `id`, `resolution` and `bitrate` drive the
/// transition, the rest is checked for consistency.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    pub id: Uuid,
    #[validate(length(min = 1, message = "path must not be empty"))]
    pub path: Option<String>,
    #[validate(range(min = 0, message = "originalSize must not be negative"))]
    pub original_size: Option<i64>,
    pub resolution: Resolution,
    pub bitrate: Bitrate,
    /// If present it must be `"pending"`, the only state a submission can request.
    pub status: Option<String>,
}

/// Body of `PATCH /api/videos/{id}/status`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    /// Target status. Only `pending` (retry a failed job) and `failed`
    /// (give up on a processing job) are accepted from outside.
    #[validate(length(min = 1, message = "status must not be empty"))]
    pub status: String,
    /// Recorded as the error when moving to `failed`.
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}
