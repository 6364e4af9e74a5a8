use super::dto::{ProcessVideoRequest, UpdateStatusRequest};
use super::model::{Bitrate, Resolution, Video, VideoStatus};
use crate::common::error::{QueueError, QueueResult};
use crate::infrastructure::store::{JobStore, ListQuery, VideoUpdate};
use crate::state::AppState;
use crate::workers::discovery;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Upper bound on re-reads after losing a race on the same job.
const MAX_CAS_ROUNDS: usize = 3;

pub struct VideoService;

impl VideoService {
    /// Validate a console submission and move the job into the pending bucket.
    pub async fn process(state: AppState, req: ProcessVideoRequest) -> QueueResult<Video> {
        req.validate()
            .map_err(|e| QueueError::Validation(e.to_string()))?;

        if let Some(status) = req.status.as_deref() {
            if status != VideoStatus::Pending.as_str() {
                return Err(QueueError::Validation(format!(
                    "status must be 'pending', got '{}'",
                    status
                )));
            }
        }

        let store = state.store.as_ref();
        if let Some(path) = req.path.as_deref() {
            let current = store.get(req.id).await?;
            if current.path != path {
                return Err(QueueError::Validation(format!(
                    "path '{}' does not match video {}",
                    path, req.id
                )));
            }
        }

        let video = enqueue(store, req.id, req.resolution, req.bitrate).await?;
        state.dispatch.wake();
        Ok(video)
    }

    /// Put a failed job back into the pending bucket with its previous parameters.
    pub async fn retry(state: AppState, id: Uuid) -> QueueResult<Video> {
        let video = retry(state.store.as_ref(), id).await?;
        state.dispatch.wake();
        Ok(video)
    }

    /// Operator status change, restricted to lifecycle edges.
    pub async fn update_status(
        state: AppState,
        id: Uuid,
        req: UpdateStatusRequest,
    ) -> QueueResult<Video> {
        req.validate()
            .map_err(|e| QueueError::Validation(e.to_string()))?;
        let wanted: VideoStatus = req.status.trim().parse().map_err(QueueError::Validation)?;

        let video = set_status(state.store.as_ref(), id, wanted, req.reason).await?;
        if video.status == VideoStatus::Pending {
            state.dispatch.wake();
        }
        Ok(video)
    }

    pub async fn find_by_id(state: AppState, id: Uuid) -> QueueResult<Video> {
        state.store.get(id).await
    }

    /// Rescan the videos directory, then list everything still unprocessed.
    pub async fn list_unprocessed(state: AppState) -> QueueResult<Vec<Video>> {
        if let Err(e) = discovery::scan(state.store.as_ref(), &state.config).await {
            warn!("Discovery scan failed, serving stored videos: {}", e);
        }

        let page = state
            .store
            .list(&ListQuery::all(VideoStatus::Unprocessed))
            .await?;
        Ok(page.items)
    }
}

/// `unprocessed|failed -> pending`, writing the parameters in the same step.
///
/// A job already pending, processing or completed is rejected with
/// `InvalidState`, so a double submit never queues the job twice.
pub async fn enqueue(
    store: &dyn JobStore,
    id: Uuid,
    resolution: Resolution,
    bitrate: Bitrate,
) -> QueueResult<Video> {
    let mut current = store.get(id).await?;

    for _ in 0..MAX_CAS_ROUNDS {
        if !current.status.is_enqueueable() {
            return Err(QueueError::InvalidState {
                id,
                status: current.status,
                wanted: VideoStatus::Pending,
            });
        }

        match store
            .update(id, current.status, VideoUpdate::Enqueue { resolution, bitrate })
            .await
        {
            Ok(video) => {
                info!(
                    job_id = %id,
                    resolution = resolution.as_str(),
                    bitrate = bitrate.as_str(),
                    "Video queued"
                );
                return Ok(video);
            }
            Err(QueueError::StoreConflict { .. }) => {
                current = store.get(id).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Err(QueueError::InvalidState {
        id,
        status: current.status,
        wanted: VideoStatus::Pending,
    })
}

/// `failed -> pending` reusing the stored parameters.
pub async fn retry(store: &dyn JobStore, id: Uuid) -> QueueResult<Video> {
    let current = store.get(id).await?;
    if current.status != VideoStatus::Failed {
        return Err(QueueError::InvalidState {
            id,
            status: current.status,
            wanted: VideoStatus::Pending,
        });
    }

    let (Some(resolution), Some(bitrate)) = (current.resolution, current.bitrate) else {
        return Err(QueueError::Internal(format!(
            "failed video {} has no conversion parameters",
            id
        )));
    };

    let video = store
        .update(
            id,
            VideoStatus::Failed,
            VideoUpdate::Enqueue {
                resolution,
                bitrate,
            },
        )
        .await
        .map_err(|e| match e {
            QueueError::StoreConflict { .. } => QueueError::InvalidState {
                id,
                status: VideoStatus::Failed,
                wanted: VideoStatus::Pending,
            },
            other => other,
        })?;

    info!(job_id = %id, attempts = video.attempts, "Video requeued for retry");
    Ok(video)
}

/// Reason recorded when an operator fails a job without giving one.
pub const REASON_OPERATOR: &str = "failed by operator";

/// Move a job to `wanted` through the same CAS as every other transition.
///
/// `pending` is the retry edge and `failed` aborts a `processing` job. The
/// edges into `processing` and `completed` belong to the workers, so they
/// are refused like any illegal edge.
pub async fn set_status(
    store: &dyn JobStore,
    id: Uuid,
    wanted: VideoStatus,
    reason: Option<String>,
) -> QueueResult<Video> {
    let current = store.get(id).await?;
    let refused = || QueueError::InvalidState {
        id,
        status: current.status,
        wanted,
    };

    match wanted {
        VideoStatus::Pending if current.status == VideoStatus::Failed => retry(store, id).await,
        VideoStatus::Failed if current.status == VideoStatus::Processing => {
            let reason = reason
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| REASON_OPERATOR.to_string());
            let video = store
                .update(id, VideoStatus::Processing, VideoUpdate::Fail { reason })
                .await
                .map_err(|e| match e {
                    QueueError::StoreConflict { .. } => refused(),
                    other => other,
                })?;
            warn!(job_id = %id, "Processing job failed by operator");
            Ok(video)
        }
        _ => Err(refused()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use crate::modules::video::model::NewVideo;

    async fn store_with(name: &str) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let video = store.create(NewVideo::from_path(name, 10)).await.unwrap();
        (store, video.id)
    }

    #[tokio::test]
    async fn second_enqueue_is_rejected() {
        let (store, id) = store_with("a.mp4").await;

        enqueue(&store, id, Resolution::P1080, Bitrate::H264).await.unwrap();
        let err = enqueue(&store, id, Resolution::P720, Bitrate::Original)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            QueueError::InvalidState {
                status: VideoStatus::Pending,
                ..
            }
        ));
        let video = store.get(id).await.unwrap();
        assert_eq!(video.resolution, Some(Resolution::P1080));

        let pending = store.list(&ListQuery::all(VideoStatus::Pending)).await.unwrap();
        assert_eq!(pending.total, 1);
    }

    #[tokio::test]
    async fn enqueue_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = enqueue(&store, Uuid::new_v4(), Resolution::Original, Bitrate::Original)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn retry_requires_failed() {
        let (store, id) = store_with("a.mp4").await;
        enqueue(&store, id, Resolution::P720, Bitrate::H264).await.unwrap();

        let err = retry(&store, id).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn retry_keeps_parameters() {
        let (store, id) = store_with("a.mp4").await;
        enqueue(&store, id, Resolution::P720, Bitrate::H264At1000k).await.unwrap();
        store
            .update(id, VideoStatus::Pending, VideoUpdate::Claim { worker_id: "worker-0".into() })
            .await
            .unwrap();
        store
            .update(id, VideoStatus::Processing, VideoUpdate::Fail { reason: "boom".into() })
            .await
            .unwrap();

        let video = retry(&store, id).await.unwrap();
        assert_eq!(video.status, VideoStatus::Pending);
        assert_eq!(video.resolution, Some(Resolution::P720));
        assert_eq!(video.bitrate, Some(Bitrate::H264At1000k));
        assert_eq!(video.error, None);
        assert_eq!(video.attempts, 1);
    }

    #[tokio::test]
    async fn failed_job_accepts_new_parameters() {
        let (store, id) = store_with("a.mp4").await;
        enqueue(&store, id, Resolution::P720, Bitrate::H264).await.unwrap();
        store
            .update(id, VideoStatus::Pending, VideoUpdate::Claim { worker_id: "worker-0".into() })
            .await
            .unwrap();
        store
            .update(id, VideoStatus::Processing, VideoUpdate::Fail { reason: "boom".into() })
            .await
            .unwrap();

        let video = enqueue(&store, id, Resolution::Original, Bitrate::Original)
            .await
            .unwrap();
        assert_eq!(video.resolution, Some(Resolution::Original));
        assert_eq!(video.status, VideoStatus::Pending);
    }

    #[tokio::test]
    async fn set_status_fails_a_processing_job() {
        let (store, id) = store_with("a.mp4").await;
        enqueue(&store, id, Resolution::P720, Bitrate::H264).await.unwrap();
        store
            .update(id, VideoStatus::Pending, VideoUpdate::Claim { worker_id: "worker-0".into() })
            .await
            .unwrap();

        let video = set_status(&store, id, VideoStatus::Failed, None).await.unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.error.as_deref(), Some(REASON_OPERATOR));

        let video = set_status(&store, id, VideoStatus::Pending, None).await.unwrap();
        assert_eq!(video.status, VideoStatus::Pending);
        assert_eq!(video.resolution, Some(Resolution::P720));
    }

    #[tokio::test]
    async fn set_status_refuses_illegal_and_worker_edges() {
        let (store, id) = store_with("a.mp4").await;

        for wanted in [
            VideoStatus::Pending,
            VideoStatus::Processing,
            VideoStatus::Completed,
            VideoStatus::Failed,
            VideoStatus::Unprocessed,
        ] {
            let err = set_status(&store, id, wanted, None).await.unwrap_err();
            assert!(matches!(err, QueueError::InvalidState { .. }), "{wanted}");
        }

        enqueue(&store, id, Resolution::P720, Bitrate::H264).await.unwrap();
        let err = set_status(&store, id, VideoStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        assert_eq!(store.get(id).await.unwrap().status, VideoStatus::Pending);
    }
}
