pub mod health;
pub mod notifications;
pub mod queue;
pub mod tick;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(notifications::router())
        .merge(queue::router())
        .merge(tick::router())
        .with_state(state)
}
