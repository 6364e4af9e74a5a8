use super::{JobStore, ListQuery, StatusCounts, StorePage, VideoUpdate};
use crate::common::error::{QueueError, QueueResult};
use crate::modules::video::model::{NewVideo, Video, VideoStatus};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use time::OffsetDateTime;
use uuid::Uuid;

/// In-process store backed by a sharded map.
///
/// A transition holds the write lock of the shard owning that job. A shard
/// covers many unrelated jobs, so transitions on jobs hashed to the same
/// shard queue behind each other for the length of one field update. No
/// transition ever waits on another shard, and nothing is awaited while a
/// shard lock is held.
#[derive(Default)]
pub struct MemoryStore {
    videos: DashMap<Uuid, Video>,
    next_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn check_transition(
    id: Uuid,
    expected: VideoStatus,
    update: &VideoUpdate,
) -> QueueResult<()> {
    let wanted = update.target();
    if expected.can_transition_to(wanted) {
        Ok(())
    } else {
        Err(QueueError::InvalidState {
            id,
            status: expected,
            wanted,
        })
    }
}

fn apply(video: &mut Video, update: VideoUpdate, now: OffsetDateTime) {
    video.status = update.target();
    video.updated_at = now;

    match update {
        VideoUpdate::Enqueue { resolution, bitrate } => {
            video.resolution = Some(resolution);
            video.bitrate = Some(bitrate);
            video.worker_id = None;
            video.error = None;
            video.output_path = None;
            video.output_size = None;
        }
        VideoUpdate::Claim { worker_id } => {
            video.worker_id = Some(worker_id);
            video.attempts += 1;
        }
        VideoUpdate::Complete {
            output_path,
            output_size,
        } => {
            video.output_path = Some(output_path);
            video.output_size = Some(output_size);
        }
        VideoUpdate::Fail { reason } => {
            video.error = Some(reason);
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, new: NewVideo) -> QueueResult<Video> {
        match self.videos.entry(new.id) {
            Entry::Occupied(_) => Err(QueueError::AlreadyExists(new.id)),
            Entry::Vacant(slot) => {
                let now = OffsetDateTime::now_utc();
                let video = Video {
                    id: new.id,
                    path: new.path,
                    resolution: None,
                    bitrate: None,
                    status: VideoStatus::Unprocessed,
                    original_size: new.original_size,
                    worker_id: None,
                    error: None,
                    output_path: None,
                    output_size: None,
                    attempts: 0,
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(video.clone());
                Ok(video)
            }
        }
    }

    async fn get(&self, id: Uuid) -> QueueResult<Video> {
        self.videos
            .get(&id)
            .map(|v| v.value().clone())
            .ok_or(QueueError::NotFound(id))
    }

    async fn update(
        &self,
        id: Uuid,
        expected: VideoStatus,
        update: VideoUpdate,
    ) -> QueueResult<Video> {
        check_transition(id, expected, &update)?;

        let mut video = self.videos.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if video.status != expected {
            return Err(QueueError::StoreConflict { id, expected });
        }

        apply(&mut video, update, OffsetDateTime::now_utc());
        Ok(video.clone())
    }

    async fn list(&self, query: &ListQuery) -> QueueResult<StorePage> {
        // Each record is cloned once, so a job's fields always come from a
        // single state even while other jobs are mutating.
        let mut snapshot: Vec<(usize, Video)> = self
            .videos
            .iter()
            .filter_map(|entry| {
                query
                    .bucket_of(entry.status)
                    .map(|bucket| (bucket, entry.value().clone()))
            })
            .collect();

        snapshot.sort_by(|(a_bucket, a), (b_bucket, b)| {
            a_bucket
                .cmp(b_bucket)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.seq.cmp(&b.seq))
        });

        let total = snapshot.len() as i64;
        let offset = query.offset.max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        let items = snapshot
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, video)| video)
            .collect();

        Ok(StorePage { items, total })
    }

    async fn count_by_status(&self) -> QueueResult<StatusCounts> {
        let mut counts = StatusCounts::default();
        for entry in self.videos.iter() {
            counts.add(entry.status, 1);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::model::{Bitrate, Resolution};
    use std::sync::Arc;

    fn enqueue() -> VideoUpdate {
        VideoUpdate::Enqueue {
            resolution: Resolution::P720,
            bitrate: Bitrate::H264,
        }
    }

    async fn seeded(store: &MemoryStore, name: &str) -> Video {
        store.create(NewVideo::from_path(name, 100)).await.unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_ids() {
        let store = MemoryStore::new();
        seeded(&store, "a.mp4").await;

        let err = store.create(NewVideo::from_path("a.mp4", 1)).await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(store.get(id).await, Err(QueueError::NotFound(_))));
        assert!(matches!(
            store.update(id, VideoStatus::Unprocessed, enqueue()).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn enqueue_sets_parameters_and_status_together() {
        let store = MemoryStore::new();
        let video = seeded(&store, "a.mp4").await;

        let updated = store
            .update(video.id, VideoStatus::Unprocessed, enqueue())
            .await
            .unwrap();

        assert_eq!(updated.status, VideoStatus::Pending);
        assert_eq!(updated.resolution, Some(Resolution::P720));
        assert_eq!(updated.bitrate, Some(Bitrate::H264));
        assert_eq!(store.get(video.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn skipping_a_state_is_rejected() {
        let store = MemoryStore::new();
        let video = seeded(&store, "a.mp4").await;

        let err = store
            .update(
                video.id,
                VideoStatus::Unprocessed,
                VideoUpdate::Claim {
                    worker_id: "w0".into(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QueueError::InvalidState { .. }));
        assert_eq!(store.get(video.id).await.unwrap().status, VideoStatus::Unprocessed);
    }

    #[tokio::test]
    async fn stale_expectation_is_a_conflict() {
        let store = MemoryStore::new();
        let video = seeded(&store, "a.mp4").await;
        store
            .update(video.id, VideoStatus::Unprocessed, enqueue())
            .await
            .unwrap();

        let err = store
            .update(video.id, VideoStatus::Unprocessed, enqueue())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::StoreConflict { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let video = seeded(&store, "a.mp4").await;
        store
            .update(video.id, VideoStatus::Unprocessed, enqueue())
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(
                            video.id,
                            VideoStatus::Pending,
                            VideoUpdate::Claim {
                                worker_id: format!("w{}", i),
                            },
                        )
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(QueueError::StoreConflict { .. }) => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(store.get(video.id).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn list_groups_by_bucket_then_insertion() {
        let store = MemoryStore::new();
        let a = seeded(&store, "a.mp4").await;
        let b = seeded(&store, "b.mp4").await;
        let c = seeded(&store, "c.mp4").await;

        for v in [&a, &b, &c] {
            store.update(v.id, VideoStatus::Unprocessed, enqueue()).await.unwrap();
        }
        store
            .update(
                a.id,
                VideoStatus::Pending,
                VideoUpdate::Claim {
                    worker_id: "w0".into(),
                },
            )
            .await
            .unwrap();

        let page = store
            .list(&ListQuery {
                statuses: vec![VideoStatus::Pending, VideoStatus::Processing],
                offset: 0,
                limit: None,
            })
            .await
            .unwrap();

        let ids: Vec<Uuid> = page.items.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn list_pages_past_the_end_are_empty() {
        let store = MemoryStore::new();
        for i in 0..3 {
            seeded(&store, &format!("{i}.mp4")).await;
        }

        let page = store
            .list(&ListQuery {
                statuses: vec![VideoStatus::Unprocessed],
                offset: 10,
                limit: Some(10),
            })
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn counts_cover_every_status() {
        let store = MemoryStore::new();
        let a = seeded(&store, "a.mp4").await;
        seeded(&store, "b.mp4").await;
        store.update(a.id, VideoStatus::Unprocessed, enqueue()).await.unwrap();

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.unprocessed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 0);
    }
}
