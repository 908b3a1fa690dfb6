//! Avatar resolution, generation, upload and serving.

pub mod errors;
pub mod gen;
pub mod handlers;
pub mod hash;
pub mod links;
pub mod resolver;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
