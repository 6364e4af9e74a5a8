use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of a video job.
///
/// Strings only appear at the boundary (JSON, the `status` column, query
/// parameters); the core always matches on the enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Unprocessed,
    Pending,
    Processing,
    Completed,
    Failed,
}

impl VideoStatus {
    /// Buckets shown by the queue view when no status filter is given, in display order.
    pub const QUEUE_BUCKETS: [VideoStatus; 3] = [
        VideoStatus::Pending,
        VideoStatus::Processing,
        VideoStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Unprocessed => "unprocessed",
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        }
    }

    /// The only legal edges of the job state machine.
    ///
    /// `failed -> pending` is the retry edge; everything else moves forward by
    /// exactly one step.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (VideoStatus::Unprocessed, VideoStatus::Pending)
                | (VideoStatus::Pending, VideoStatus::Processing)
                | (VideoStatus::Processing, VideoStatus::Completed)
                | (VideoStatus::Processing, VideoStatus::Failed)
                | (VideoStatus::Failed, VideoStatus::Pending)
        )
    }

    /// Whether a job in this state may be (re)submitted with parameters.
    pub fn is_enqueueable(&self) -> bool {
        self.can_transition_to(VideoStatus::Pending)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(VideoStatus::Unprocessed),
            "pending" => Ok(VideoStatus::Pending),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(format!("unknown video status '{}'", other)),
        }
    }
}

/// Requested output resolution.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum Resolution {
    Original,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Original => "Original",
            Resolution::P1080 => "1080p",
            Resolution::P720 => "720p",
        }
    }

    /// Target frame height, `None` keeps the source height.
    pub fn height(&self) -> Option<u32> {
        match self {
            Resolution::Original => None,
            Resolution::P1080 => Some(1080),
            Resolution::P720 => Some(720),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Original" => Ok(Resolution::Original),
            "1080p" => Ok(Resolution::P1080),
            "720p" => Ok(Resolution::P720),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// Requested output encoding profile.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum Bitrate {
    Original,
    #[serde(rename = "h264")]
    H264,
    #[serde(rename = "h264@1000k")]
    H264At1000k,
}

impl Bitrate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bitrate::Original => "Original",
            Bitrate::H264 => "h264",
            Bitrate::H264At1000k => "h264@1000k",
        }
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Original" => Ok(Bitrate::Original),
            "h264" => Ok(Bitrate::H264),
            "h264@1000k" => Ok(Bitrate::H264At1000k),
            other => Err(format!("unknown bitrate '{}'", other)),
        }
    }
}

/// One source video and its conversion job.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<Bitrate>,
    pub status: VideoStatus,
    pub original_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<i64>,
    pub attempts: i32,
    #[serde(skip)]
    pub seq: i64,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
}

/// A freshly discovered source file.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: Uuid,
    pub path: String,
    pub original_size: i64,
}

impl NewVideo {
    /// Ids are derived from the relative path so rediscovering a file maps to
    /// the same record.
    pub fn from_path(path: impl Into<String>, original_size: i64) -> Self {
        let path = path.into();
        Self {
            id: video_id_for_path(&path),
            path,
            original_size,
        }
    }
}

pub fn video_id_for_path(path: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, path.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [VideoStatus; 5] = [
        VideoStatus::Unprocessed,
        VideoStatus::Pending,
        VideoStatus::Processing,
        VideoStatus::Completed,
        VideoStatus::Failed,
    ];

    #[test]
    fn only_lifecycle_edges_are_legal() {
        let legal: Vec<(VideoStatus, VideoStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (VideoStatus::Unprocessed, VideoStatus::Pending),
                (VideoStatus::Pending, VideoStatus::Processing),
                (VideoStatus::Processing, VideoStatus::Completed),
                (VideoStatus::Processing, VideoStatus::Failed),
                (VideoStatus::Failed, VideoStatus::Pending),
            ]
        );
    }

    #[test]
    fn completed_is_terminal() {
        assert!(ALL.iter().all(|s| !VideoStatus::Completed.can_transition_to(*s)));
        assert!(!VideoStatus::Completed.is_enqueueable());
        assert!(VideoStatus::Failed.is_enqueueable());
    }

    #[test]
    fn parameters_use_console_spellings() {
        assert_eq!(serde_json::to_string(&Resolution::P1080).unwrap(), "\"1080p\"");
        assert_eq!(serde_json::to_string(&Bitrate::H264At1000k).unwrap(), "\"h264@1000k\"");
        assert_eq!("720p".parse::<Resolution>(), Ok(Resolution::P720));
        assert!("480p".parse::<Resolution>().is_err());
        assert!(serde_json::from_str::<Bitrate>("\"vp9\"").is_err());
    }

    #[test]
    fn unset_parameters_are_omitted() {
        let now = OffsetDateTime::now_utc();
        let video = Video {
            id: video_id_for_path("a.mp4"),
            path: "a.mp4".into(),
            resolution: None,
            bitrate: None,
            status: VideoStatus::Unprocessed,
            original_size: 42,
            worker_id: None,
            error: None,
            output_path: None,
            output_size: None,
            attempts: 0,
            seq: 1,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&video).unwrap();
        assert_eq!(json["status"], "unprocessed");
        assert_eq!(json["originalSize"], 42);
        assert!(json.get("resolution").is_none());
        assert!(json.get("bitrate").is_none());
        assert!(json.get("seq").is_none());
    }

    #[test]
    fn ids_are_stable_per_path() {
        assert_eq!(video_id_for_path("x/a.mp4"), video_id_for_path("x/a.mp4"));
        assert_ne!(video_id_for_path("x/a.mp4"), video_id_for_path("y/a.mp4"));
    }
}
