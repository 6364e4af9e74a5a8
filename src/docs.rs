use utoipa::OpenApi;
use crate::infrastructure::store::StatusCounts;
use crate::modules::queue::dto::{Pagination, QueueBuckets, QueueResponse};
use crate::modules::video::dto::{ProcessVideoRequest, UpdateStatusRequest};
use crate::modules::video::model::{Bitrate, Resolution, Video, VideoStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::list_unprocessed,
        crate::modules::video::handler::process_video,
        crate::modules::video::handler::get_video,
        crate::modules::video::handler::retry_video,
        crate::modules::video::handler::update_status,
        crate::modules::queue::handler::get_queue,
        crate::modules::queue::handler::get_stats,
    ),
    components(
        schemas(
            Video, VideoStatus, Resolution, Bitrate,
            ProcessVideoRequest, UpdateStatusRequest,
            QueueResponse, QueueBuckets, Pagination,
            StatusCounts,
        )
    ),
    tags(
        (name = "Videos", description = "Discovered videos and conversion submissions"),
        (name = "Queue", description = "Conversion queue monitoring")
    )
)]
pub struct ApiDoc;
