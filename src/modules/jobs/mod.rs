use axum::Router;
use axum::routing::{get, put};
use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod model;
pub mod registry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(handler::get_job))
        .route("/{id}/status", put(handler::update_status))
}
