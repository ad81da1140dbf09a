//! Shared application state for the Axum API server.

use std::sync::Arc;

use pastime_engine::NotificationScheduler;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<NotificationScheduler>,
    /// Expected `X-Scheduler-Token`; `None` leaves `/api/*` open.
    pub token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(scheduler: Arc<NotificationScheduler>, token: Option<String>) -> Self {
        Self {
            scheduler,
            token: token.map(Arc::from),
        }
    }
}
