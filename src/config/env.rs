use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    VideosDir,
    OutputDir,
    VideoExtensions,
    WorkerCount,
    JobTimeoutSecs,
    DispatchPollMs,
    DiscoveryIntervalSecs,
    MaxAttempts,
    StaleGraceSecs,
    FfmpegPath,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::VideosDir => "VIDEOS_DIR",
            EnvKey::OutputDir => "OUTPUT_DIR",
            EnvKey::VideoExtensions => "VIDEO_EXTENSIONS",
            EnvKey::WorkerCount => "WORKER_COUNT",
            EnvKey::JobTimeoutSecs => "JOB_TIMEOUT_SECS",
            EnvKey::DispatchPollMs => "DISPATCH_POLL_MS",
            EnvKey::DiscoveryIntervalSecs => "DISCOVERY_INTERVAL_SECS",
            EnvKey::MaxAttempts => "MAX_ATTEMPTS",
            EnvKey::StaleGraceSecs => "STALE_GRACE_SECS",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Unset and empty both count as absent.
pub fn get_opt(key: EnvKey) -> Option<String> {
    get(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
