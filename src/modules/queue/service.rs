use super::dto::{Pagination, QueueBuckets, QueueQuery, QueueResponse, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::common::error::{QueueError, QueueResult};
use crate::infrastructure::store::{JobStore, ListQuery, StatusCounts};
use crate::modules::video::model::VideoStatus;

pub struct QueueService;

impl QueueService {
    /// One page of the queue view, grouped `pending, processing, completed`.
    ///
    /// Items, `total` and `pages` are computed from a single store snapshot.
    pub async fn page(store: &dyn JobStore, query: QueueQuery) -> QueueResult<QueueResponse> {
        let page = query.page.unwrap_or(1).max(1);
        let page_size = match query.page_size {
            Some(size) if (1..=MAX_PAGE_SIZE).contains(&size) => size,
            _ => DEFAULT_PAGE_SIZE,
        };
        let statuses = parse_filter(query.status.as_deref())?;

        let result = store
            .list(&ListQuery {
                statuses,
                offset: (page - 1).saturating_mul(page_size),
                limit: Some(page_size),
            })
            .await?;

        let mut queue = QueueBuckets {
            total: result.total,
            ..QueueBuckets::default()
        };
        for video in result.items {
            match video.status {
                VideoStatus::Pending => queue.pending.push(video),
                VideoStatus::Processing => queue.processing.push(video),
                VideoStatus::Completed => queue.completed.push(video),
                VideoStatus::Failed => queue.failed.push(video),
                VideoStatus::Unprocessed => {}
            }
        }

        Ok(QueueResponse {
            queue,
            pagination: Pagination {
                page,
                page_size,
                total: result.total,
                pages: page_count(result.total, page_size),
            },
        })
    }

    pub async fn stats(store: &dyn JobStore) -> QueueResult<StatusCounts> {
        store.count_by_status().await
    }
}

/// `ceil(total / page_size)`
pub fn page_count(total: i64, page_size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total + page_size - 1) / page_size
    }
}

fn parse_filter(status: Option<&str>) -> QueueResult<Vec<VideoStatus>> {
    match status.map(str::trim) {
        None | Some("") | Some("all") => Ok(VideoStatus::QUEUE_BUCKETS.to_vec()),
        Some(raw) => match raw.parse::<VideoStatus>() {
            Ok(VideoStatus::Unprocessed) => Err(QueueError::Validation(
                "unprocessed videos are not part of the queue".to_string(),
            )),
            Ok(status) => Ok(vec![status]),
            Err(e) => Err(QueueError::Validation(e)),
        },
    }
}
