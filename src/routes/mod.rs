pub mod admin;
pub mod members;
pub mod public;
pub mod sessions;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/members", members::router())
        .merge(sessions::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
