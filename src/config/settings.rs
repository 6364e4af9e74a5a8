use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub videos_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Lowercase, without the leading dot.
    pub video_extensions: Vec<String>,
    pub worker_count: usize,
    pub job_timeout_secs: u64,
    pub dispatch_poll_ms: u64,
    pub discovery_interval_secs: u64,
    pub max_attempts: i32,
    pub stale_grace_secs: u64,
    pub ffmpeg_path: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 8080),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            videos_dir: PathBuf::from(env::get_or(EnvKey::VideosDir, "./videos")),
            output_dir: PathBuf::from(env::get_or(EnvKey::OutputDir, "./processed")),
            video_extensions: parse_extensions(&env::get_or(EnvKey::VideoExtensions, "mp4")),
            worker_count: env::get_parsed(EnvKey::WorkerCount, 2usize).max(1),
            job_timeout_secs: env::get_parsed(EnvKey::JobTimeoutSecs, 3600),
            dispatch_poll_ms: env::get_parsed(EnvKey::DispatchPollMs, 2000),
            discovery_interval_secs: env::get_parsed(EnvKey::DiscoveryIntervalSecs, 30),
            max_attempts: env::get_parsed(EnvKey::MaxAttempts, 1).max(1),
            stale_grace_secs: env::get_parsed(EnvKey::StaleGraceSecs, 300),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
        })
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms.max(10))
    }

    /// A `processing` job untouched for longer than this has lost its worker.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs.saturating_add(self.stale_grace_secs))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: None,
            videos_dir: PathBuf::from("./videos"),
            output_dir: PathBuf::from("./processed"),
            video_extensions: vec!["mp4".to_string()],
            worker_count: 2,
            job_timeout_secs: 3600,
            dispatch_poll_ms: 2000,
            discovery_interval_secs: 30,
            max_attempts: 1,
            stale_grace_secs: 300,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
