use crate::modules::video::model::Video;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query string of `GET /api/queue`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct QueueQuery {
    /// 1-indexed page, values below 1 are treated as 1.
    pub page: Option<i64>,
    /// Items per page, 1..=100; anything else falls back to 10.
    pub page_size: Option<i64>,
    /// `pending`, `processing`, `completed`, `failed`, or empty for the three queue buckets.
    pub status: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct QueueBuckets {
    pub pending: Vec<Video>,
    pub processing: Vec<Video>,
    pub completed: Vec<Video>,
    pub failed: Vec<Video>,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueResponse {
    pub queue: QueueBuckets,
    pub pagination: Pagination,
}
