pub mod dto;
pub mod handlers;
mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub use services::UserService;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::user_routes())
}
