//! Producer-facing entry point: `queue_notification` and queue statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use pastime_common::error::{AppError, FailureKind};
use pastime_common::types::{NewQueueEntry, NotificationType, QueueStats};

use crate::aggregator::BatchAggregator;
use crate::clock::Clock;
use crate::collaborators::PermissionOracle;
use crate::rate_limit::RateLimiter;
use crate::store::QueueStore;
use crate::window::WindowScheduler;

/// Outcome of `queue_notification`. Rejections are informational, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueResult {
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureKind>,
    /// Oracle-supplied or limiter-supplied explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<Uuid>,
    /// True when the event joined an existing digest entry.
    pub merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl QueueResult {
    fn accepted(entry_id: Uuid, merged: bool, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            queued: true,
            reason: None,
            detail: None,
            entry_id: Some(entry_id),
            merged,
            scheduled_for: Some(scheduled_for),
        }
    }

    fn rejected(reason: FailureKind, detail: Option<String>) -> Self {
        Self {
            queued: false,
            reason: Some(reason),
            detail,
            entry_id: None,
            merged: false,
            scheduled_for: None,
        }
    }
}

pub struct NotificationQueue {
    store: Arc<dyn QueueStore>,
    oracle: Arc<dyn PermissionOracle>,
    limiter: Arc<dyn RateLimiter>,
    aggregator: BatchAggregator,
    windows: WindowScheduler,
    clock: Arc<dyn Clock>,
    max_attempts: i32,
}

impl NotificationQueue {
    pub fn new(
        store: Arc<dyn QueueStore>,
        oracle: Arc<dyn PermissionOracle>,
        limiter: Arc<dyn RateLimiter>,
        windows: WindowScheduler,
        clock: Arc<dyn Clock>,
        max_attempts: i32,
    ) -> Self {
        Self {
            aggregator: BatchAggregator::new(store.clone(), windows.clone(), max_attempts),
            store,
            oracle,
            limiter,
            windows,
            clock,
            max_attempts,
        }
    }

    /// Queue a notification at the clock's current time.
    pub async fn queue_notification(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        payload: Value,
    ) -> Result<QueueResult, AppError> {
        self.queue_at(user_id, notification_type, payload, self.clock.now())
            .await
    }

    /// Queue a notification as of `now`.
    ///
    /// The cap check here is advisory. Immediate-class notifications skip it
    /// and are only checked at dispatch time.
    pub async fn queue_at(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        payload: Value,
        now: DateTime<Utc>,
    ) -> Result<QueueResult, AppError> {
        let permission = self.oracle.can_send(user_id, notification_type).await?;
        if !permission.allowed {
            tracing::info!(
                user_id = %user_id,
                notification_type = %notification_type,
                reason = permission.reason.as_deref().unwrap_or("unspecified"),
                "Notification not permitted"
            );
            return Ok(QueueResult::rejected(
                FailureKind::PermissionDenied,
                permission.reason,
            ));
        }

        if !notification_type.is_immediate() && self.limiter.would_exceed(user_id, now).await? {
            tracing::info!(
                user_id = %user_id,
                notification_type = %notification_type,
                cap = self.limiter.daily_cap(),
                "Daily cap reached, notification not queued"
            );
            return Ok(QueueResult::rejected(
                FailureKind::RateLimited,
                Some(format!("daily cap of {} reached", self.limiter.daily_cap())),
            ));
        }

        if notification_type == NotificationType::AchievementDigest {
            let outcome = self.aggregator.merge_or_create(user_id, payload, now).await?;
            let scheduled_for = self
                .windows
                .compute_scheduled_time(notification_type, now);
            return Ok(QueueResult::accepted(
                outcome.entry_id(),
                outcome.is_merged(),
                scheduled_for,
            ));
        }

        let scheduled_for = self.windows.compute_scheduled_time(notification_type, now);
        let entry = NewQueueEntry::new(user_id, notification_type, payload, now, scheduled_for)
            .with_max_attempts(self.max_attempts);
        let entry_id = self.store.create(entry).await?;

        tracing::info!(
            entry_id = %entry_id,
            user_id = %user_id,
            notification_type = %notification_type,
            scheduled_for = %scheduled_for,
            "Notification queued"
        );
        Ok(QueueResult::accepted(entry_id, false, scheduled_for))
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, AppError> {
        self.store.status_counts().await
    }
}
