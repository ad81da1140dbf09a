use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{
    NewQueueEntry, NotificationType, QueueEntry, QueueEntryPatch, QueueStats, QueueStatus,
    TimeRange,
};

use super::QueueStore;
use crate::window::Phase;

/// PostgreSQL-backed queue store over the `notification_queue` table.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: PgPool,
}

impl PgQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Shared UPDATE for `update` and `update_if`. A `None` expected status
    /// makes the write unconditional.
    async fn patch(
        &self,
        id: Uuid,
        expected: Option<QueueStatus>,
        patch: &QueueEntryPatch,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_queue SET
                status          = COALESCE($3, status),
                payload         = COALESCE($4, payload),
                scheduled_for   = COALESCE($5, scheduled_for),
                attempts        = COALESCE($6, attempts),
                last_attempt_at = COALESCE($7, last_attempt_at),
                last_error      = CASE WHEN $8 THEN $9 ELSE last_error END
            WHERE id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(patch.status)
        .bind(&patch.payload)
        .bind(patch.scheduled_for)
        .bind(patch.attempts)
        .bind(patch.last_attempt_at)
        .bind(patch.last_error.is_some())
        .bind(patch.last_error.clone().flatten())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn create(&self, entry: NewQueueEntry) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO notification_queue
                (id, user_id, notification_type, payload, status, queued_at, scheduled_for, attempts, max_attempts)
            VALUES ($1, $2, $3, $4, 'queued', $5, $6, 0, $7)
            "#,
        )
        .bind(id)
        .bind(entry.user_id)
        .bind(entry.notification_type)
        .bind(&entry.payload)
        .bind(entry.queued_at)
        .bind(entry.scheduled_for)
        .bind(entry.max_attempts)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            entry_id = %id,
            user_id = %entry.user_id,
            notification_type = %entry.notification_type,
            scheduled_for = %entry.scheduled_for,
            "Queue entry created"
        );

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, AppError> {
        let entry = sqlx::query_as("SELECT * FROM notification_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    async fn find_merge_candidate(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        day: TimeRange,
    ) -> Result<Option<QueueEntry>, AppError> {
        let entry = sqlx::query_as(
            r#"
            SELECT * FROM notification_queue
            WHERE user_id = $1
              AND notification_type = $2
              AND status = 'queued'
              AND scheduled_for >= $3
              AND scheduled_for < $4
            ORDER BY queued_at
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(notification_type)
        .bind(day.start)
        .bind(day.end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn update(&self, id: Uuid, patch: &QueueEntryPatch) -> Result<(), AppError> {
        if self.patch(id, None, patch).await? == 0 {
            return Err(AppError::NotFound(format!("queue entry {id}")));
        }
        Ok(())
    }

    async fn update_if(
        &self,
        id: Uuid,
        expected: QueueStatus,
        patch: &QueueEntryPatch,
    ) -> Result<bool, AppError> {
        Ok(self.patch(id, Some(expected), patch).await? == 1)
    }

    async fn append_to_payload(
        &self,
        id: Uuid,
        key: &str,
        item: serde_json::Value,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notification_queue
            SET payload = jsonb_set(
                CASE WHEN jsonb_typeof(payload) = 'object' THEN payload ELSE '{}'::jsonb END,
                ARRAY[$2::text],
                COALESCE(payload -> $2::text, '[]'::jsonb) || jsonb_build_array($3::jsonb)
            )
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(key)
        .bind(&item)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn query_due(
        &self,
        notification_type: Option<NotificationType>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let entries = sqlx::query_as(
            r#"
            SELECT * FROM notification_queue
            WHERE status = 'queued'
              AND scheduled_for <= $1
              AND ($2::text IS NULL OR notification_type = $2)
            ORDER BY scheduled_for, queued_at
            "#,
        )
        .bind(now)
        .bind(notification_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn count_status(
        &self,
        user_id: Uuid,
        status: QueueStatus,
        range: TimeRange,
    ) -> Result<u32, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notification_queue
            WHERE user_id = $1
              AND status = $2
              AND COALESCE(last_attempt_at, queued_at) >= $3
              AND COALESCE(last_attempt_at, queued_at) < $4
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count_committed(
        &self,
        user_id: Uuid,
        range: TimeRange,
        exclude: Uuid,
    ) -> Result<u32, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notification_queue
            WHERE user_id = $1
              AND id <> $2
              AND status IN ('sent', 'processing')
              AND COALESCE(last_attempt_at, queued_at) >= $3
              AND COALESCE(last_attempt_at, queued_at) < $4
            "#,
        )
        .bind(user_id)
        .bind(exclude)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn status_counts(&self) -> Result<QueueStats, AppError> {
        let rows: Vec<(QueueStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM notification_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.record(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }

    async fn find_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<QueueEntry>, AppError> {
        let entries = sqlx::query_as(
            r#"
            SELECT * FROM notification_queue
            WHERE status = 'processing'
              AND COALESCE(last_attempt_at, queued_at) < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn mark_phase_run(&self, phase: Phase, window_key: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO phase_runs (phase, window_key) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(phase.as_str())
        .bind(window_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_phase_run(&self, phase: Phase, window_key: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM phase_runs WHERE phase = $1 AND window_key = $2")
            .bind(phase.as_str())
            .bind(window_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
