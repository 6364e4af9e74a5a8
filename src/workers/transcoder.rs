use crate::modules::video::model::{Bitrate, Resolution};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Everything the encoder needs for one job.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    pub resolution: Resolution,
    pub bitrate: Bitrate,
}

#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    pub path: PathBuf,
    pub size: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("source file {0} is missing")]
    MissingSource(PathBuf),

    #[error("failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("encoder exited with {code:?}: {stderr}")]
    Encoder { code: Option<i32>, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The external conversion step. The queue only sees success or failure.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, req: &TranscodeRequest) -> Result<TranscodeOutput, TranscodeError>;
}

/// Runs `ffmpeg` as a child process.
///
/// The child is killed when the returned future is dropped, which is how the
/// worker pool enforces its timeout.
pub struct FfmpegTranscoder {
    program: String,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Keep the tail of ffmpeg's stderr, which is where the actual error is.
const STDERR_TAIL: usize = 600;

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, req: &TranscodeRequest) -> Result<TranscodeOutput, TranscodeError> {
        if !tokio::fs::try_exists(&req.input).await.unwrap_or(false) {
            return Err(TranscodeError::MissingSource(req.input.clone()));
        }
        if let Some(parent) = req.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = ffmpeg_args(req);
        debug!(job_id = %req.id, "{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(TranscodeError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Err(TranscodeError::Encoder {
                code: output.status.code(),
                stderr: stderr[tail_start..].trim().to_string(),
            });
        }

        let size = tokio::fs::metadata(&req.output).await?.len() as i64;
        info!(job_id = %req.id, output = %req.output.display(), size, "🎬 Encode finished");

        Ok(TranscodeOutput {
            path: req.output.clone(),
            size,
        })
    }
}

/// Map the two console parameters onto an ffmpeg command line.
pub fn ffmpeg_args(req: &TranscodeRequest) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-i"]
        .map(String::from)
        .to_vec();
    args.push(req.input.to_string_lossy().into_owned());

    if req.resolution == Resolution::Original && req.bitrate == Bitrate::Original {
        args.extend(["-c", "copy"].map(String::from));
    } else {
        args.extend(["-c:v", "libx264", "-preset", "fast"].map(String::from));
        if req.bitrate == Bitrate::H264At1000k {
            args.extend(["-b:v", "1000k"].map(String::from));
        }
        if let Some(height) = req.resolution.height() {
            args.push("-vf".to_string());
            args.push(format!("scale=-2:{}", height));
        }
        args.extend(["-c:a", "aac"].map(String::from));
    }

    args.extend(["-movflags", "+faststart"].map(String::from));
    args.push(req.output.to_string_lossy().into_owned());
    args
}

/// `<output_dir>/<source dir>/<stem>_<resolution>_<bitrate>.mp4`
pub fn output_path_for(output_dir: &Path, relative: &str, resolution: Resolution, bitrate: Bitrate) -> PathBuf {
    let relative = Path::new(relative);
    let stem = relative
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let file = format!("{}_{}_{}.mp4", stem, resolution.as_str(), bitrate.as_str());

    match relative.parent() {
        Some(parent) => output_dir.join(parent).join(file),
        None => output_dir.join(file),
    }
}
