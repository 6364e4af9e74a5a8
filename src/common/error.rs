use crate::common::response::ApiError;
use crate::modules::video::model::VideoStatus;
use axum::http::StatusCode;
use uuid::Uuid;

pub type QueueResult<T> = Result<T, QueueError>;

/// Failure modes of the job queue core.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Video {0} not found")]
    NotFound(Uuid),

    #[error("Video {id} is {status} and cannot move to {wanted}")]
    InvalidState {
        id: Uuid,
        status: VideoStatus,
        wanted: VideoStatus,
    },

    /// Lost a compare-and-swap on the job status. Retried internally.
    #[error("Video {id} changed concurrently (expected {expected})")]
    StoreConflict { id: Uuid, expected: VideoStatus },

    #[error("Video {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Encode failed: {0}")]
    EncodeFailure(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueueError::NotFound(_) => StatusCode::NOT_FOUND,
            QueueError::InvalidState { .. } | QueueError::AlreadyExists(_) => StatusCode::CONFLICT,
            QueueError::Validation(_) => StatusCode::BAD_REQUEST,
            QueueError::StoreConflict { .. }
            | QueueError::EncodeFailure(_)
            | QueueError::Timeout(_)
            | QueueError::Database(_)
            | QueueError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        let status = e.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", e);
            return ApiError("Internal server error".to_string(), status);
        }
        ApiError(e.to_string(), status)
    }
}
