use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::Router;

pub mod dto;
pub mod handler;
pub mod model;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/unprocessed", get(handler::list_unprocessed))
        .route("/process", post(handler::process_video))
        .route("/{id}", get(handler::get_video))
        .route("/{id}/retry", post(handler::retry_video))
        .route("/{id}/status", patch(handler::update_status))
}
