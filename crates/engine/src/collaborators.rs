//! Read-only collaborators the scheduler consults but does not own.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{NotificationType, TimeRange};

/// Verdict of the permission oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Permission {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a user may receive a notification category. Re-engagement
/// mail additionally requires marketing consent.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn can_send(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<Permission, AppError>;
}

/// Resolves the delivery address for a user.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, AppError>;
}

/// One user's activity over a week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyReport {
    pub user_id: Uuid,
    pub total_minutes: i64,
    pub sessions: i64,
    pub active_days: i64,
    pub top_hobby: Option<String>,
}

impl WeeklyReport {
    /// The queue payload for a `WeeklySummary` entry.
    pub fn to_payload(&self, week_start: NaiveDate) -> serde_json::Value {
        serde_json::json!({
            "week_start": week_start.format("%Y-%m-%d").to_string(),
            "total_minutes": self.total_minutes,
            "sessions": self.sessions,
            "active_days": self.active_days,
            "top_hobby": self.top_hobby,
        })
    }
}

#[async_trait]
pub trait WeeklyStatsSupplier: Send + Sync {
    /// Activity aggregated over `week` for every user eligible for a summary.
    async fn weekly_reports(&self, week: TimeRange) -> Result<Vec<WeeklyReport>, AppError>;
}

#[async_trait]
pub trait ActivityTracker: Send + Sync {
    /// Users whose most recent activity fell on the local day exactly `days`
    /// before `today`.
    async fn users_inactive_for(&self, days: u32, today: TimeRange)
    -> Result<Vec<Uuid>, AppError>;
}
