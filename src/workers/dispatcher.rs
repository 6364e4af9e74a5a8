//! Dispatcher: hands pending jobs to free worker slots in FIFO order.
//!
//! Free slots live in a bounded channel prefilled with `0..worker_count`.
//! The loop takes a slot, claims the oldest pending job with a CAS on its
//! status and runs it in its own task; the task puts the slot back when the
//! job is resolved. At most `worker_count` jobs are ever in `processing` on
//! behalf of one dispatcher.

use crate::common::error::{QueueError, QueueResult};
use crate::config::settings::AppConfig;
use crate::infrastructure::store::{ListQuery, SharedStore, VideoUpdate};
use crate::modules::video::model::{Video, VideoStatus};
use crate::modules::video::service;
use crate::workers::pool::WorkerPool;
use crate::workers::transcoder::Transcoder;
use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Candidates fetched per claim attempt.
const CLAIM_BATCH: i64 = 8;
/// Refetches after every candidate in a batch was taken by someone else.
const CLAIM_ROUNDS: usize = 3;

pub const REASON_CRASHED: &str = "worker crashed";
pub const REASON_RESTART: &str = "interrupted by restart";
pub const REASON_LOST: &str = "worker lost";

/// Wakes the dispatcher as soon as something becomes pending, instead of
/// waiting for the next poll tick.
#[derive(Clone, Default)]
pub struct DispatchSignal(Arc<Notify>);

impl DispatchSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.0.notify_one();
    }

    pub async fn notified(&self) {
        self.0.notified().await
    }
}

pub struct Dispatcher {
    store: SharedStore,
    pool: WorkerPool,
    signal: DispatchSignal,
    free_tx: Sender<usize>,
    free_rx: Receiver<usize>,
    /// Jobs this dispatcher is running right now, with their worker id.
    running: Arc<DashMap<Uuid, String>>,
    poll: Duration,
    stale_after: Duration,
    max_attempts: i32,
}

impl Dispatcher {
    pub fn new(
        store: SharedStore,
        transcoder: Arc<dyn Transcoder>,
        config: &AppConfig,
        signal: DispatchSignal,
    ) -> Self {
        let workers = config.worker_count.max(1);
        let (free_tx, free_rx) = async_channel::bounded(workers);
        for slot in 0..workers {
            // Capacity equals the slot count, so this cannot fail.
            let _ = free_tx.try_send(slot);
        }

        let pool = WorkerPool::new(
            store.clone(),
            transcoder,
            config.videos_dir.clone(),
            config.output_dir.clone(),
            config.job_timeout(),
        );

        Self {
            store,
            pool,
            signal,
            free_tx,
            free_rx,
            running: Arc::new(DashMap::new()),
            poll: config.dispatch_poll(),
            stale_after: config.stale_after(),
            max_attempts: config.max_attempts,
        }
    }

    /// Fail every job left in `processing` by a previous run.
    ///
    /// Must run before [`Dispatcher::run`]; nothing is executing yet, so any
    /// `processing` record is an orphan.
    pub async fn recover_interrupted(&self) -> QueueResult<usize> {
        let orphans = self
            .store
            .list(&ListQuery::all(VideoStatus::Processing))
            .await?;

        let mut recovered = 0;
        for video in orphans.items {
            if self.fail_orphan(video.id, REASON_RESTART).await? {
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(recovered, "Marked jobs interrupted by restart as failed");
        }
        Ok(recovered)
    }

    /// Fail `processing` jobs that are not running here and have not moved
    /// for longer than the job timeout plus grace.
    ///
    /// A window reaching past the earliest representable time never expires.
    pub async fn reap_stale(&self) -> QueueResult<usize> {
        let Some(cutoff) = stale_cutoff(OffsetDateTime::now_utc(), self.stale_after) else {
            return Ok(0);
        };
        let processing = self
            .store
            .list(&ListQuery::all(VideoStatus::Processing))
            .await?;

        let mut reaped = 0;
        for video in processing.items {
            if video.updated_at > cutoff || self.running.contains_key(&video.id) {
                continue;
            }
            if self.fail_orphan(video.id, REASON_LOST).await? {
                warn!(job_id = %video.id, worker = ?video.worker_id, "Reaped stale job");
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn fail_orphan(&self, id: Uuid, reason: &str) -> QueueResult<bool> {
        let update = VideoUpdate::Fail {
            reason: reason.to_string(),
        };
        match self.store.update(id, VideoStatus::Processing, update).await {
            Ok(_) => Ok(true),
            Err(QueueError::StoreConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Claim the oldest pending job for `worker_id`.
    ///
    /// Losing the CAS on a candidate just moves on to the next one; `None`
    /// means nothing is pending.
    pub async fn claim_next(&self, worker_id: &str) -> QueueResult<Option<Video>> {
        let query = ListQuery {
            statuses: vec![VideoStatus::Pending],
            offset: 0,
            limit: Some(CLAIM_BATCH),
        };

        for _ in 0..CLAIM_ROUNDS {
            let candidates = self.store.list(&query).await?;
            if candidates.items.is_empty() {
                return Ok(None);
            }

            for candidate in candidates.items {
                let claim = VideoUpdate::Claim {
                    worker_id: worker_id.to_string(),
                };
                match self.store.update(candidate.id, VideoStatus::Pending, claim).await {
                    Ok(video) => return Ok(Some(video)),
                    Err(QueueError::StoreConflict { .. }) | Err(QueueError::NotFound(_)) => {
                        debug!(job_id = %candidate.id, "Lost claim race, trying next job");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(None)
    }

    /// Dispatch until `cancel` fires, then wait for in-flight jobs to settle.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            workers = self.free_tx.capacity().unwrap_or(0),
            "🚀 Dispatcher started"
        );
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        // Reaping runs on its own tick so a steady backlog cannot starve it.
        let mut reap_tick = tokio::time::interval(self.poll);
        reap_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            in_flight.retain(|handle| !handle.is_finished());

            let slot = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = reap_tick.tick() => {
                    self.reap_logged().await;
                    continue;
                }
                slot = self.free_rx.recv() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let worker_id = format!("worker-{}", slot);
            match self.claim_next(&worker_id).await {
                Ok(Some(video)) => {
                    in_flight.push(self.spawn_job(slot, video, cancel.child_token()));
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!("Failed to claim next job: {}", e),
            }

            self.release(slot);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = reap_tick.tick() => self.reap_logged().await,
                _ = self.signal.notified() => {}
                _ = tokio::time::sleep(self.poll) => {}
            }
        }

        info!(in_flight = in_flight.len(), "Dispatcher stopping, waiting for running jobs");
        join_all(in_flight).await;
        info!("Dispatcher stopped");
    }

    async fn reap_logged(&self) {
        if let Err(e) = self.reap_stale().await {
            warn!("Stale job check failed: {}", e);
        }
    }

    fn release(&self, slot: usize) {
        if self.free_tx.try_send(slot).is_err() {
            error!(slot, "Worker slot could not be returned");
        }
    }

    /// Run one claimed job under a supervisor that resolves it even if the
    /// worker task panics, then frees the slot.
    fn spawn_job(&self, slot: usize, video: Video, cancel: CancellationToken) -> JoinHandle<()> {
        let id = video.id;
        let worker_id = video.worker_id.clone().unwrap_or_default();
        self.running.insert(id, worker_id.clone());

        let pool = self.pool.clone();
        let store = self.store.clone();
        let running = self.running.clone();
        let free_tx = self.free_tx.clone();
        let signal = self.signal.clone();
        let max_attempts = self.max_attempts;

        tokio::spawn(async move {
            let job_cancel = cancel.clone();
            let worker = tokio::spawn(async move { pool.run_job(video, job_cancel).await });

            let outcome = match worker.await {
                Ok(Ok(video)) => Some(video),
                Ok(Err(e)) => {
                    error!(job_id = %id, worker = %worker_id, "Could not record job outcome: {}", e);
                    None
                }
                Err(join_err) => {
                    error!(job_id = %id, worker = %worker_id, "💥 Worker crashed: {}", join_err);
                    let crashed = VideoUpdate::Fail {
                        reason: REASON_CRASHED.to_string(),
                    };
                    match store.update(id, VideoStatus::Processing, crashed).await {
                        Ok(video) => Some(video),
                        Err(e) => {
                            error!(job_id = %id, "Could not fail crashed job: {}", e);
                            None
                        }
                    }
                }
            };

            running.remove(&id);

            if let Some(video) = outcome {
                let retryable = video.status == VideoStatus::Failed
                    && video.attempts < max_attempts
                    && !cancel.is_cancelled();
                if retryable {
                    match service::retry(store.as_ref(), id).await {
                        Ok(video) => {
                            info!(job_id = %id, attempts = video.attempts, max_attempts, "🔁 Retrying failed job");
                        }
                        Err(e) => warn!(job_id = %id, "Automatic retry skipped: {}", e),
                    }
                }
            }

            if free_tx.send(slot).await.is_err() {
                debug!(slot, "Dispatcher gone, slot dropped");
            }
            signal.wake();
        })
    }
}

/// `now - window`, or `None` when that instant is not representable.
fn stale_cutoff(now: OffsetDateTime, window: Duration) -> Option<OffsetDateTime> {
    let window = time::Duration::try_from(window).ok()?;
    now.checked_sub(window)
}
