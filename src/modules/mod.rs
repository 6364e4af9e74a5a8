pub mod queue;
pub mod video;
