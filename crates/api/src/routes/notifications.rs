//! Queueing endpoint used by the product backend when a notable event occurs.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::NotificationType;
use pastime_engine::queue::QueueResult;

use crate::middleware::auth::SchedulerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/notifications", post(queue_notification))
}

/// Fields are taken as strings so bad values surface as 400 with our error body.
#[derive(Debug, Deserialize)]
pub struct QueueNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl QueueNotificationRequest {
    fn validate(self) -> Result<(Uuid, NotificationType, Value), AppError> {
        let user_id = Uuid::parse_str(&self.user_id)
            .map_err(|_| AppError::Validation(format!("invalid user_id '{}'", self.user_id)))?;
        let notification_type: NotificationType =
            self.notification_type.parse().map_err(AppError::Validation)?;
        let payload = match self.payload {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(Value::Object(map)) => Value::Object(map),
            Some(_) => return Err(AppError::Validation("payload must be a JSON object".into())),
        };
        Ok((user_id, notification_type, payload))
    }
}

/// POST /api/notifications: queue (or merge) a notification.
///
/// A permission or cap rejection is a normal outcome and comes back as
/// `200` with `queued: false` and a `reason`.
async fn queue_notification(
    State(state): State<AppState>,
    _auth: SchedulerAuth,
    Json(request): Json<QueueNotificationRequest>,
) -> Result<Json<QueueResult>, AppError> {
    let (user_id, notification_type, payload) = request.validate()?;
    let result = state
        .scheduler
        .queue_notification(user_id, notification_type, payload)
        .await?;
    Ok(Json(result))
}
