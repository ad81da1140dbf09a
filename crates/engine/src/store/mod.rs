//! Queue Store contract and its implementations.
//!
//! The only synchronization primitive the engine relies on is the conditional
//! update ([`QueueStore::update_if`]): it succeeds for exactly one caller when
//! several race on the same entry.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{
    NewQueueEntry, NotificationType, QueueEntry, QueueEntryPatch, QueueStats, QueueStatus,
    TimeRange,
};

use crate::window::Phase;

pub use memory::InMemoryQueueStore;
pub use postgres::PgQueueStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new `Queued` entry and return its id.
    async fn create(&self, entry: NewQueueEntry) -> Result<Uuid, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, AppError>;

    /// A `Queued` entry of `notification_type` for `user_id` whose
    /// `scheduled_for` falls inside `day`.
    async fn find_merge_candidate(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        day: TimeRange,
    ) -> Result<Option<QueueEntry>, AppError>;

    /// Unconditional patch. Fails with `NotFound` for an unknown id.
    async fn update(&self, id: Uuid, patch: &QueueEntryPatch) -> Result<(), AppError>;

    /// Apply `patch` only if the entry is currently in `expected` status.
    /// Returns whether the patch was applied.
    async fn update_if(
        &self,
        id: Uuid,
        expected: QueueStatus,
        patch: &QueueEntryPatch,
    ) -> Result<bool, AppError>;

    /// `Queued -> Processing`, stamping `last_attempt_at`. Exactly one of
    /// several concurrent claimers wins.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        self.update_if(
            id,
            QueueStatus::Queued,
            &QueueEntryPatch::status(QueueStatus::Processing).attempted_at(now),
        )
        .await
    }

    /// Push `item` onto the array at `payload[key]`, creating the array if
    /// missing. Only applies while the entry is still `Queued`.
    async fn append_to_payload(
        &self,
        id: Uuid,
        key: &str,
        item: serde_json::Value,
    ) -> Result<bool, AppError>;

    /// `Queued` entries with `scheduled_for <= now`, oldest schedule first.
    async fn query_due(
        &self,
        notification_type: Option<NotificationType>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, AppError>;

    /// Entries of `user_id` in `status` whose last attempt (or queue time, if
    /// never attempted) falls in `range`.
    async fn count_status(
        &self,
        user_id: Uuid,
        status: QueueStatus,
        range: TimeRange,
    ) -> Result<u32, AppError>;

    /// Entries of `user_id` that are `Sent` or `Processing` with their last
    /// attempt in `range`, not counting `exclude`. Used to reserve send
    /// capacity while other dispatchers hold claims for the same user.
    async fn count_committed(
        &self,
        user_id: Uuid,
        range: TimeRange,
        exclude: Uuid,
    ) -> Result<u32, AppError>;

    async fn status_counts(&self) -> Result<QueueStats, AppError>;

    /// `Processing` entries last touched before `cutoff`.
    async fn find_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<QueueEntry>, AppError>;

    /// Record that `phase` ran for `window_key`. Returns `false` if it was
    /// already recorded.
    async fn mark_phase_run(&self, phase: Phase, window_key: &str) -> Result<bool, AppError>;

    /// Forget a phase run so a later tick in the same window can retry it.
    async fn clear_phase_run(&self, phase: Phase, window_key: &str) -> Result<(), AppError>;
}

/// The instant used for day-bucketed counting.
pub(crate) fn activity_instant(entry: &QueueEntry) -> DateTime<Utc> {
    entry.last_attempt_at.unwrap_or(entry.queued_at)
}
