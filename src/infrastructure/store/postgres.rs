use super::memory::check_transition;
use super::{JobStore, ListQuery, StatusCounts, StorePage, VideoUpdate};
use crate::common::error::{QueueError, QueueResult};
use crate::infrastructure::db::pool::DbPool;
use crate::modules::video::model::{NewVideo, Video, VideoStatus};
use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

const COLS: &str = "id, seq, path, original_size, resolution, bitrate, status, worker_id, \
    error, output_path, output_size, attempts, created_at, updated_at";

#[derive(Debug, FromRow)]
struct VideoRow {
    id: Uuid,
    seq: i64,
    path: String,
    original_size: i64,
    resolution: Option<String>,
    bitrate: Option<String>,
    status: String, // stored as text, parsed at the edge
    worker_id: Option<String>,
    error: Option<String>,
    output_path: Option<String>,
    output_size: Option<i64>,
    attempts: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<VideoRow> for Video {
    type Error = QueueError;

    fn try_from(row: VideoRow) -> Result<Self, Self::Error> {
        Ok(Video {
            id: row.id,
            path: row.path,
            resolution: row
                .resolution
                .map(|r| r.parse())
                .transpose()
                .map_err(QueueError::Internal)?,
            bitrate: row
                .bitrate
                .map(|b| b.parse())
                .transpose()
                .map_err(QueueError::Internal)?,
            status: row.status.parse().map_err(QueueError::Internal)?,
            original_size: row.original_size,
            worker_id: row.worker_id,
            error: row.error,
            output_path: row.output_path,
            output_size: row.output_size,
            attempts: row.attempts,
            seq: row.seq,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Durable store on Postgres. Transitions are single conditional `UPDATE`s,
/// so the row lock taken by Postgres is the only per-job serialization.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Tell a lost CAS apart from a missing row.
    async fn miss(&self, id: Uuid, expected: VideoStatus) -> QueueError {
        let exists = sqlx::query_scalar::<_, i64>("SELECT 1::BIGINT FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match exists {
            Ok(Some(_)) => QueueError::StoreConflict { id, expected },
            Ok(None) => QueueError::NotFound(id),
            Err(e) => QueueError::Database(e),
        }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create(&self, new: NewVideo) -> QueueResult<Video> {
        let sql = format!(
            r#"
            INSERT INTO videos (id, path, original_size, status)
            VALUES ($1, $2, $3, 'unprocessed')
            ON CONFLICT (id) DO NOTHING
            RETURNING {COLS}
            "#
        );

        let row = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(new.id)
            .bind(&new.path)
            .bind(new.original_size)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(QueueError::AlreadyExists(new.id)),
        }
    }

    async fn get(&self, id: Uuid) -> QueueResult<Video> {
        let sql = format!("SELECT {COLS} FROM videos WHERE id = $1");
        sqlx::query_as::<_, VideoRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QueueError::NotFound(id))?
            .try_into()
    }

    async fn update(
        &self,
        id: Uuid,
        expected: VideoStatus,
        update: VideoUpdate,
    ) -> QueueResult<Video> {
        check_transition(id, expected, &update)?;

        let set = match &update {
            VideoUpdate::Enqueue { .. } => {
                "resolution = $4, bitrate = $5, worker_id = NULL, error = NULL, \
                 output_path = NULL, output_size = NULL"
            }
            VideoUpdate::Claim { .. } => "worker_id = $4, attempts = attempts + 1",
            VideoUpdate::Complete { .. } => "output_path = $4, output_size = $5",
            VideoUpdate::Fail { .. } => "error = $4",
        };
        let sql = format!(
            r#"
            UPDATE videos
            SET status = $3, {set}, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {COLS}
            "#
        );

        let query = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(update.target().as_str());
        let query = match update {
            VideoUpdate::Enqueue {
                resolution,
                bitrate,
            } => query.bind(resolution.as_str()).bind(bitrate.as_str()),
            VideoUpdate::Claim { worker_id } => query.bind(worker_id),
            VideoUpdate::Complete {
                output_path,
                output_size,
            } => query.bind(output_path).bind(output_size),
            VideoUpdate::Fail { reason } => query.bind(reason),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(row) => row.try_into(),
            None => Err(self.miss(id, expected).await),
        }
    }

    async fn list(&self, query: &ListQuery) -> QueueResult<StorePage> {
        let statuses: Vec<String> = query
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // Count and page must agree, so both reads share one snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM videos WHERE status = ANY($1::text[])")
                .bind(statuses.clone())
                .fetch_one(&mut *tx)
                .await?;

        let sql = format!(
            r#"
            SELECT {COLS}
            FROM videos
            WHERE status = ANY($1::text[])
            ORDER BY array_position($1::text[], status), created_at ASC, seq ASC
            OFFSET $2
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, VideoRow>(&sql)
            .bind(statuses)
            .bind(query.offset.max(0))
            .bind(query.limit)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(Video::try_from)
            .collect::<QueueResult<Vec<_>>>()?;

        Ok(StorePage { items, total })
    }

    async fn count_by_status(&self) -> QueueResult<StatusCounts> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM videos GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            let status: VideoStatus = status.parse().map_err(QueueError::Internal)?;
            counts.add(status, n);
        }
        Ok(counts)
    }
}
