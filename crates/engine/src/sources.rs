//! PostgreSQL-backed collaborators over the `users` and `activity_log` tables.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{NotificationType, TimeRange};

use crate::clock::LocalCalendar;
use crate::collaborators::{
    ActivityTracker, Permission, PermissionOracle, RecipientDirectory, WeeklyReport,
    WeeklyStatsSupplier,
};

/// Eligibility flags stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct UserFlags {
    pub email_notifications: bool,
    pub marketing_consent: bool,
}

/// Reads the user's opt-in flags.
#[derive(Clone)]
pub struct PgPermissionOracle {
    pool: PgPool,
}

impl PgPermissionOracle {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Pure decision over the stored flags.
    pub fn evaluate(flags: Option<UserFlags>, notification_type: NotificationType) -> Permission {
        let Some(flags) = flags else {
            return Permission::deny("unknown user");
        };
        if !flags.email_notifications {
            return Permission::deny("email notifications disabled");
        }
        if notification_type == NotificationType::ReEngagement && !flags.marketing_consent {
            return Permission::deny("no marketing consent");
        }
        Permission::allow()
    }
}

#[async_trait]
impl PermissionOracle for PgPermissionOracle {
    async fn can_send(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<Permission, AppError> {
        let flags: Option<UserFlags> = sqlx::query_as(
            "SELECT email_notifications, marketing_consent FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(Self::evaluate(flags, notification_type))
    }
}

#[derive(Clone)]
pub struct PgRecipientDirectory {
    pool: PgPool,
}

impl PgRecipientDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipientDirectory for PgRecipientDirectory {
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(email.flatten().filter(|e| !e.trim().is_empty()))
    }
}

/// Finds users whose last logged session fell on a given local day.
#[derive(Clone)]
pub struct PgActivityTracker {
    pool: PgPool,
}

impl PgActivityTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityTracker for PgActivityTracker {
    async fn users_inactive_for(
        &self,
        days: u32,
        today: TimeRange,
    ) -> Result<Vec<Uuid>, AppError> {
        let shift = Duration::days(i64::from(days));
        let day = TimeRange::new(today.start - shift, today.end - shift);

        let users: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT user_id
            FROM activity_log
            GROUP BY user_id
            HAVING MAX(logged_at) >= $1 AND MAX(logged_at) < $2
            "#,
        )
        .bind(day.start)
        .bind(day.end)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(days, users = users.len(), "Inactive users found");
        Ok(users)
    }
}

/// Aggregates `activity_log` per user for a week. Users with notifications
/// enabled but no sessions get a zeroed report.
#[derive(Clone)]
pub struct PgWeeklyStats {
    pool: PgPool,
    calendar: LocalCalendar,
}

impl PgWeeklyStats {
    pub fn new(pool: PgPool, calendar: LocalCalendar) -> Self {
        Self { pool, calendar }
    }
}

#[async_trait]
impl WeeklyStatsSupplier for PgWeeklyStats {
    async fn weekly_reports(&self, week: TimeRange) -> Result<Vec<WeeklyReport>, AppError> {
        let offset_minutes = self.calendar.offset().local_minus_utc() / 60;

        let reports: Vec<WeeklyReport> = sqlx::query_as(
            r#"
            SELECT
                u.id AS user_id,
                COALESCE(SUM(a.minutes), 0)::BIGINT AS total_minutes,
                COUNT(a.id) AS sessions,
                COUNT(DISTINCT ((a.logged_at AT TIME ZONE 'UTC') + make_interval(mins => $3))::date)
                    AS active_days,
                (
                    SELECT t.hobby
                    FROM activity_log t
                    WHERE t.user_id = u.id AND t.logged_at >= $1 AND t.logged_at < $2
                    GROUP BY t.hobby
                    ORDER BY SUM(t.minutes) DESC, t.hobby
                    LIMIT 1
                ) AS top_hobby
            FROM users u
            LEFT JOIN activity_log a
                ON a.user_id = u.id AND a.logged_at >= $1 AND a.logged_at < $2
            WHERE u.email_notifications
            GROUP BY u.id
            ORDER BY u.id
            "#,
        )
        .bind(week.start)
        .bind(week.end)
        .bind(offset_minutes)
        .fetch_all(&self.pool)
        .await?;

        Ok(reports)
    }
}
