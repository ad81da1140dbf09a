use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a notable event; decides the scheduling window and merge behavior.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationType {
    AchievementDigest,
    StreakMilestone,
    WeeklySummary,
    ReEngagement,
}

/// Scheduling class a notification type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleClass {
    /// Short debounce delay, dispatched on every tick.
    Immediate,
    /// Canonical evening digest window.
    Daily,
    /// Sunday generate-then-send window.
    Weekly,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [
        NotificationType::AchievementDigest,
        NotificationType::StreakMilestone,
        NotificationType::WeeklySummary,
        NotificationType::ReEngagement,
    ];

    pub fn schedule_class(self) -> ScheduleClass {
        match self {
            NotificationType::StreakMilestone | NotificationType::ReEngagement => {
                ScheduleClass::Immediate
            }
            NotificationType::AchievementDigest => ScheduleClass::Daily,
            NotificationType::WeeklySummary => ScheduleClass::Weekly,
        }
    }

    pub fn is_immediate(self) -> bool {
        self.schedule_class() == ScheduleClass::Immediate
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::AchievementDigest => "achievement_digest",
            NotificationType::StreakMilestone => "streak_milestone",
            NotificationType::WeeklySummary => "weekly_summary",
            NotificationType::ReEngagement => "re_engagement",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown notification type '{s}'"))
    }
}

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
    Sent,
    Failed,
    RateLimited,
}

impl QueueStatus {
    /// Terminal entries are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Sent | QueueStatus::Failed | QueueStatus::RateLimited
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Processing => "processing",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
            QueueStatus::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default number of delivery attempts before an entry is marked failed.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// A durable record representing one pending or completed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    /// Type-specific data. Achievement digests carry an append-only
    /// `achievements` list.
    pub payload: serde_json::Value,
    pub status: QueueStatus,
    pub queued_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Queued && self.scheduled_for <= now
    }

    /// Apply a patch in place. Store implementations share this so the
    /// in-memory and SQL stores agree on patch semantics.
    pub fn apply(&mut self, patch: &QueueEntryPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(payload) = &patch.payload {
            self.payload = payload.clone();
        }
        if let Some(scheduled_for) = patch.scheduled_for {
            self.scheduled_for = scheduled_for;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            self.last_attempt_at = Some(last_attempt_at);
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }
    }
}

/// Fields required to create a queue entry; the store assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueEntry {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub payload: serde_json::Value,
    pub queued_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub max_attempts: i32,
}

impl NewQueueEntry {
    /// Build a new entry. `scheduled_for` is clamped so it never precedes
    /// `queued_at`.
    pub fn new(
        user_id: Uuid,
        notification_type: NotificationType,
        payload: serde_json::Value,
        queued_at: DateTime<Utc>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            payload,
            queued_at,
            scheduled_for: scheduled_for.max(queued_at),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn into_entry(self, id: Uuid) -> QueueEntry {
        QueueEntry {
            id,
            user_id: self.user_id,
            notification_type: self.notification_type,
            payload: self.payload,
            status: QueueStatus::Queued,
            queued_at: self.queued_at,
            scheduled_for: self.scheduled_for,
            attempts: 0,
            max_attempts: self.max_attempts,
            last_attempt_at: None,
            last_error: None,
        }
    }
}

/// Partial update of a queue entry. `None` leaves a field untouched;
/// `last_error: Some(None)` clears the stored error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueEntryPatch {
    pub status: Option<QueueStatus>,
    pub payload: Option<serde_json::Value>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub attempts: Option<i32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<Option<String>>,
}

impl QueueEntryPatch {
    pub fn status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn attempts(mut self, attempts: i32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(at);
        self
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }
}

/// Half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Queue-wide counters for operational monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: u64,
    pub queued: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
    pub rate_limited: u64,
}

impl QueueStats {
    pub fn record(&mut self, status: QueueStatus, count: u64) {
        self.total += count;
        match status {
            QueueStatus::Queued => self.queued += count,
            QueueStatus::Processing => self.processing += count,
            QueueStatus::Sent => self.sent += count,
            QueueStatus::Failed => self.failed += count,
            QueueStatus::RateLimited => self.rate_limited += count,
        }
    }
}
