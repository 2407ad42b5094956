use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
mod password;
pub mod query;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::health_routes())
}
