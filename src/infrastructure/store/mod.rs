//! Job store: the single shared record of every video's lifecycle.
//!
//! Every status change goes through [`JobStore::update`], a compare-and-swap
//! on the current status, so two racing transitions on one job never both
//! succeed. Backends serialize per job, never across jobs.

pub mod memory;
pub mod postgres;

use crate::common::error::QueueResult;
use crate::modules::video::model::{Bitrate, NewVideo, Resolution, Video, VideoStatus};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type SharedStore = Arc<dyn JobStore>;

/// One state transition and the fields it writes, applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoUpdate {
    /// `unprocessed|failed -> pending`. Clears any previous error/output.
    Enqueue { resolution: Resolution, bitrate: Bitrate },
    /// `pending -> processing`, bound to a worker slot.
    Claim { worker_id: String },
    /// `processing -> completed`.
    Complete { output_path: String, output_size: i64 },
    /// `processing -> failed`.
    Fail { reason: String },
}

impl VideoUpdate {
    pub fn target(&self) -> VideoStatus {
        match self {
            VideoUpdate::Enqueue { .. } => VideoStatus::Pending,
            VideoUpdate::Claim { .. } => VideoStatus::Processing,
            VideoUpdate::Complete { .. } => VideoStatus::Completed,
            VideoUpdate::Fail { .. } => VideoStatus::Failed,
        }
    }
}

/// Status-filtered slice of the store.
///
/// Results are grouped by the position of their status in `statuses`, then
/// ordered by `created_at` and insertion sequence.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub statuses: Vec<VideoStatus>,
    pub offset: i64,
    /// `None` returns everything after `offset`.
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn all(status: VideoStatus) -> Self {
        Self {
            statuses: vec![status],
            offset: 0,
            limit: None,
        }
    }

    /// Position of a status in the requested bucket order.
    pub(crate) fn bucket_of(&self, status: VideoStatus) -> Option<usize> {
        self.statuses.iter().position(|s| *s == status)
    }
}

/// A page of results plus the size of the whole filtered set, read from the
/// same snapshot.
#[derive(Debug, Clone, Default)]
pub struct StorePage {
    pub items: Vec<Video>,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCounts {
    pub unprocessed: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: VideoStatus, n: i64) {
        match status {
            VideoStatus::Unprocessed => self.unprocessed += n,
            VideoStatus::Pending => self.pending += n,
            VideoStatus::Processing => self.processing += n,
            VideoStatus::Completed => self.completed += n,
            VideoStatus::Failed => self.failed += n,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a newly discovered video as `unprocessed`.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, video: NewVideo) -> QueueResult<Video>;

    async fn get(&self, id: Uuid) -> QueueResult<Video>;

    /// Apply `update` only if the job is currently `expected`.
    ///
    /// Errors: `NotFound`, `InvalidState` when `expected -> update.target()` is
    /// not a lifecycle edge, `StoreConflict` when the status moved underneath.
    async fn update(&self, id: Uuid, expected: VideoStatus, update: VideoUpdate)
        -> QueueResult<Video>;

    async fn list(&self, query: &ListQuery) -> QueueResult<StorePage>;

    async fn count_by_status(&self) -> QueueResult<StatusCounts>;
}
