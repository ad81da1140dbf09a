//! Manual tick trigger, for deployments driven by an external cron instead
//! of the `pastime-ticker` loop.

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use pastime_engine::coordinator::TickReport;

use crate::middleware::auth::SchedulerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/tick", post(run_tick))
}

#[derive(Debug, Default, Deserialize)]
pub struct TickParams {
    /// Evaluate the tick at this instant instead of the scheduler clock.
    pub at: Option<DateTime<Utc>>,
}

/// POST /api/tick: run one tick and return what it did. Never fails; phase
/// errors are listed in the report. An `at` override does not reclaim stuck
/// entries.
async fn run_tick(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
    Query(params): Query<TickParams>,
) -> Json<TickReport> {
    let report = match params.at {
        Some(at) => state.scheduler.tick_at(at).await,
        None => state.scheduler.tick(state.scheduler.now()).await,
    };
    Json(report)
}
