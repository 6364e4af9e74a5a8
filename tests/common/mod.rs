//! Shared harness for the HTTP tests.
//!
//! [`TestApp`] builds the full router over an in-memory store and a temporary
//! videos directory. No dispatcher runs, so jobs stay where the test puts them.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use video_queue::app::create_app;
use video_queue::config::settings::AppConfig;
use video_queue::infrastructure::store::{JobStore, MemoryStore, VideoUpdate};
use video_queue::modules::video::model::{Bitrate, NewVideo, Resolution, VideoStatus};
use video_queue::state::AppState;
use video_queue::workers::dispatcher::DispatchSignal;

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub videos_dir: TempDir,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let videos_dir = tempfile::tempdir().expect("failed to create videos dir");
        let config = AppConfig {
            videos_dir: videos_dir.path().to_path_buf(),
            output_dir: PathBuf::from("/tmp/video-queue-test-out"),
            ..AppConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(config, store.clone(), DispatchSignal::new());

        Self {
            store,
            videos_dir,
            router: create_app(state),
        }
    }

    /// Drop a source file into the videos directory.
    pub fn add_file(&self, relative: &str, bytes: &[u8]) {
        let path = self.videos_dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    /// Insert a job directly and walk it to `status`.
    pub async fn seed(&self, path: &str, status: VideoStatus) -> Uuid {
        let id = self.store.create(NewVideo::from_path(path, 100)).await.unwrap().id;
        if status == VideoStatus::Unprocessed {
            return id;
        }

        self.store
            .update(
                id,
                VideoStatus::Unprocessed,
                VideoUpdate::Enqueue {
                    resolution: Resolution::P720,
                    bitrate: Bitrate::H264,
                },
            )
            .await
            .unwrap();
        if status == VideoStatus::Pending {
            return id;
        }

        self.store
            .update(
                id,
                VideoStatus::Pending,
                VideoUpdate::Claim {
                    worker_id: "worker-0".into(),
                },
            )
            .await
            .unwrap();
        let last = match status {
            VideoStatus::Completed => VideoUpdate::Complete {
                output_path: format!("/out/{}", path),
                output_size: 42,
            },
            VideoStatus::Failed => VideoUpdate::Fail {
                reason: "encoder exited with Some(1)".into(),
            },
            _ => return id,
        };
        self.store.update(id, VideoStatus::Processing, last).await.unwrap();
        id
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn patch_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::patch(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}
