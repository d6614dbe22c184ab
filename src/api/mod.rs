// API module - HTTP endpoints

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub mod health;
pub mod kill_switch;
pub mod middleware;

use middleware::state::AppState;

/// Full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(kill_switch::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
