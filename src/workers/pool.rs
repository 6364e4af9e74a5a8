use crate::common::error::{QueueError, QueueResult};
use crate::infrastructure::store::{SharedStore, VideoUpdate};
use crate::modules::video::model::{Video, VideoStatus};
use crate::workers::transcoder::{output_path_for, TranscodeRequest, Transcoder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Executes claimed jobs.
///
/// The store is touched only to record the outcome; the encode itself runs
/// without holding anything in the store.
#[derive(Clone)]
pub struct WorkerPool {
    store: SharedStore,
    transcoder: Arc<dyn Transcoder>,
    videos_dir: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(
        store: SharedStore,
        transcoder: Arc<dyn Transcoder>,
        videos_dir: PathBuf,
        output_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            transcoder,
            videos_dir,
            output_dir,
            timeout,
        }
    }

    fn request_for(&self, video: &Video) -> QueueResult<TranscodeRequest> {
        let (Some(resolution), Some(bitrate)) = (video.resolution, video.bitrate) else {
            return Err(QueueError::Internal(format!(
                "video {} was claimed without conversion parameters",
                video.id
            )));
        };

        Ok(TranscodeRequest {
            id: video.id,
            input: self.videos_dir.join(&video.path),
            output: output_path_for(&self.output_dir, &video.path, resolution, bitrate),
            resolution,
            bitrate,
        })
    }

    /// Run one `processing` job to completion and record the outcome.
    ///
    /// Encoder errors, timeouts and shutdown all end in `failed`; they are
    /// terminal for the job but never returned as an error.
    pub async fn run_job(&self, video: Video, cancel: CancellationToken) -> QueueResult<Video> {
        let id = video.id;
        let worker = video.worker_id.clone().unwrap_or_default();
        let started = Instant::now();
        info!(job_id = %id, worker = %worker, path = %video.path, "Transcoding started");

        let update = match self.request_for(&video) {
            Err(e) => VideoUpdate::Fail {
                reason: e.to_string(),
            },
            Ok(request) => {
                tokio::select! {
                    result = tokio::time::timeout(self.timeout, self.transcoder.transcode(&request)) => {
                        match result {
                            Ok(Ok(output)) => VideoUpdate::Complete {
                                output_path: output.path.to_string_lossy().into_owned(),
                                output_size: output.size,
                            },
                            Ok(Err(e)) => VideoUpdate::Fail {
                                reason: QueueError::EncodeFailure(e.to_string()).to_string(),
                            },
                            Err(_) => VideoUpdate::Fail {
                                reason: QueueError::Timeout(self.timeout.as_secs()).to_string(),
                            },
                        }
                    }
                    _ = cancel.cancelled() => VideoUpdate::Fail {
                        reason: "interrupted by shutdown".to_string(),
                    },
                }
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &update {
            VideoUpdate::Fail { reason } => {
                error!(job_id = %id, worker = %worker, elapsed, error = %reason, "❌ Transcoding failed")
            }
            _ => info!(job_id = %id, worker = %worker, elapsed, "✅ Transcoding completed"),
        }

        match self.store.update(id, VideoStatus::Processing, update).await {
            Ok(video) => Ok(video),
            Err(QueueError::StoreConflict { .. }) => {
                warn!(job_id = %id, "Job was resolved elsewhere, dropping this outcome");
                self.store.get(id).await
            }
            Err(e) => Err(e),
        }
    }
}
