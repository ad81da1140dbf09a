use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use pastime_common::error::AppError;
use pastime_common::types::QueueStats;

use crate::middleware::auth::SchedulerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/queue/stats", get(queue_stats))
}

/// GET /api/queue/stats: entry counts per status.
async fn queue_stats(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
) -> Result<Json<QueueStats>, AppError> {
    Ok(Json(state.scheduler.queue_stats().await?))
}
