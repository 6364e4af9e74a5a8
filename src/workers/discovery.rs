//! Discovery: turns source files under the videos directory into
//! `unprocessed` jobs.

use crate::common::error::{QueueError, QueueResult};
use crate::config::settings::AppConfig;
use crate::infrastructure::store::{JobStore, SharedStore};
use crate::modules::video::model::NewVideo;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub scanned: usize,
    pub discovered: usize,
}

/// Walk the videos directory and create a job for every file not seen before.
///
/// Known files keep their existing record whatever its status.
pub async fn scan(store: &dyn JobStore, config: &AppConfig) -> QueueResult<DiscoveryReport> {
    let root = config.videos_dir.clone();
    let extensions = config.video_extensions.clone();

    let files = tokio::task::spawn_blocking(move || collect_videos(&root, &extensions))
        .await
        .map_err(|e| QueueError::Internal(format!("discovery task failed: {}", e)))?;

    let mut report = DiscoveryReport {
        scanned: files.len(),
        discovered: 0,
    };

    for (path, size) in files {
        match store.create(NewVideo::from_path(path, size)).await {
            Ok(video) => {
                info!(job_id = %video.id, path = %video.path, "📼 Discovered new video");
                report.discovered += 1;
            }
            Err(QueueError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
    }

    debug!(
        scanned = report.scanned,
        discovered = report.discovered,
        "Discovery scan finished"
    );
    Ok(report)
}

/// Periodic rescan until shutdown.
pub async fn run_discovery_loop(store: SharedStore, config: AppConfig, cancel: CancellationToken) {
    let period = Duration::from_secs(config.discovery_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    info!("🔎 Discovery watching {}", config.videos_dir.display());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = scan(store.as_ref(), &config).await {
                    warn!("Discovery scan failed: {}", e);
                }
            }
        }
    }

    info!("Discovery stopped");
}

/// Relative path (always `/`-separated) and byte size of every matching file.
fn collect_videos(root: &Path, extensions: &[String]) -> Vec<(String, i64)> {
    if !root.is_dir() {
        debug!("Videos directory {} does not exist yet", root.display());
        return Vec::new();
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry during discovery: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_video_extension(entry.path(), extensions) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len() as i64).unwrap_or(0);
        found.push((to_slash_path(relative), size));
    }
    found
}

fn has_video_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

fn to_slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::{ListQuery, MemoryStore};
    use crate::modules::video::model::{video_id_for_path, VideoStatus};
    use std::fs;

    fn config_for(dir: &Path) -> AppConfig {
        AppConfig {
            videos_dir: dir.to_path_buf(),
            video_extensions: vec!["mp4".to_string()],
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn discovers_matching_files_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("shows")).unwrap();
        fs::write(dir.path().join("a.mp4"), b"12345").unwrap();
        fs::write(dir.path().join("shows/ep1.MP4"), b"1").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

        let store = MemoryStore::new();
        let config = config_for(dir.path());

        let first = scan(&store, &config).await.unwrap();
        assert_eq!(first, DiscoveryReport { scanned: 2, discovered: 2 });

        let second = scan(&store, &config).await.unwrap();
        assert_eq!(second, DiscoveryReport { scanned: 2, discovered: 0 });

        let video = store.get(video_id_for_path("a.mp4")).await.unwrap();
        assert_eq!(video.original_size, 5);
        assert_eq!(video.status, VideoStatus::Unprocessed);

        let nested = store.get(video_id_for_path("shows/ep1.MP4")).await.unwrap();
        assert_eq!(nested.path, "shows/ep1.MP4");
    }

    #[tokio::test]
    async fn missing_directory_finds_nothing() {
        let store = MemoryStore::new();
        let config = config_for(Path::new("/definitely/not/here"));

        let report = scan(&store, &config).await.unwrap();
        assert_eq!(report, DiscoveryReport::default());
        let page = store.list(&ListQuery::all(VideoStatus::Unprocessed)).await.unwrap();
        assert_eq!(page.total, 0);
    }
}
