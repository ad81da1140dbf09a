//! Batch aggregator for achievement digests.
//!
//! Same-day achievements for a user collapse into one `AchievementDigest`
//! entry. The merge key is the user plus the local day of the computed
//! `scheduled_for`, so an event arriving after the evening window joins
//! tomorrow's digest rather than today's.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{NewQueueEntry, NotificationType};

use crate::store::QueueStore;
use crate::window::WindowScheduler;

/// Payload key holding the list of merged achievement records.
pub const ACHIEVEMENTS_KEY: &str = "achievements";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The event was appended to an existing queued digest.
    Merged(Uuid),
    /// A new digest entry was created.
    Created(Uuid),
}

impl MergeOutcome {
    pub fn entry_id(self) -> Uuid {
        match self {
            MergeOutcome::Merged(id) | MergeOutcome::Created(id) => id,
        }
    }

    pub fn is_merged(self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

pub struct BatchAggregator {
    store: Arc<dyn QueueStore>,
    windows: WindowScheduler,
    max_attempts: i32,
}

impl BatchAggregator {
    pub fn new(store: Arc<dyn QueueStore>, windows: WindowScheduler, max_attempts: i32) -> Self {
        Self {
            store,
            windows,
            max_attempts,
        }
    }

    /// Append `event` to the user's queued digest for the target day, or
    /// start a new digest if none is open.
    pub async fn merge_or_create(
        &self,
        user_id: Uuid,
        event: Value,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, AppError> {
        let scheduled_for = self
            .windows
            .compute_scheduled_time(NotificationType::AchievementDigest, now);
        let day = self.windows.calendar().day_of(scheduled_for);

        if let Some(candidate) = self
            .store
            .find_merge_candidate(user_id, NotificationType::AchievementDigest, day)
            .await?
        {
            if self
                .store
                .append_to_payload(candidate.id, ACHIEVEMENTS_KEY, event.clone())
                .await?
            {
                tracing::debug!(
                    entry_id = %candidate.id,
                    user_id = %user_id,
                    "Achievement merged into queued digest"
                );
                return Ok(MergeOutcome::Merged(candidate.id));
            }

            // Claimed between lookup and append; fall through so the event
            // is not lost.
            tracing::debug!(
                entry_id = %candidate.id,
                user_id = %user_id,
                "Digest left queue before merge, starting a new one"
            );
        }

        let mut payload = serde_json::Map::new();
        payload.insert(ACHIEVEMENTS_KEY.to_string(), Value::Array(vec![event]));
        let entry = NewQueueEntry::new(
            user_id,
            NotificationType::AchievementDigest,
            Value::Object(payload),
            now,
            scheduled_for,
        )
        .with_max_attempts(self.max_attempts);
        let id = self.store.create(entry).await?;

        tracing::debug!(
            entry_id = %id,
            user_id = %user_id,
            scheduled_for = %scheduled_for,
            "Achievement digest created"
        );
        Ok(MergeOutcome::Created(id))
    }
}
