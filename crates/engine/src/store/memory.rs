use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::{
    NewQueueEntry, NotificationType, QueueEntry, QueueEntryPatch, QueueStats, QueueStatus,
    TimeRange,
};

use super::{QueueStore, activity_instant};
use crate::window::Phase;

#[derive(Default)]
struct Inner {
    entries: HashMap<Uuid, QueueEntry>,
    phase_runs: HashSet<(Phase, String)>,
}

/// Process-local queue store. Every operation holds a single lock, so the
/// conditional update is trivially exclusive.
#[derive(Default)]
pub struct InMemoryQueueStore {
    inner: Mutex<Inner>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, ordered by queue time.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self.lock().entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.queued_at, e.id));
        entries
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn create(&self, entry: NewQueueEntry) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        self.lock().entries.insert(id, entry.into_entry(id));
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueEntry>, AppError> {
        Ok(self.lock().entries.get(&id).cloned())
    }

    async fn find_merge_candidate(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        day: TimeRange,
    ) -> Result<Option<QueueEntry>, AppError> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|e| {
                e.user_id == user_id
                    && e.notification_type == notification_type
                    && e.status == QueueStatus::Queued
                    && day.contains(e.scheduled_for)
            })
            .min_by_key(|e| e.queued_at)
            .cloned())
    }

    async fn update(&self, id: Uuid, patch: &QueueEntryPatch) -> Result<(), AppError> {
        let mut inner = self.lock();
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("queue entry {id}")))?;
        entry.apply(patch);
        Ok(())
    }

    async fn update_if(
        &self,
        id: Uuid,
        expected: QueueStatus,
        patch: &QueueEntryPatch,
    ) -> Result<bool, AppError> {
        let mut inner = self.lock();
        match inner.entries.get_mut(&id) {
            Some(entry) if entry.status == expected => {
                entry.apply(patch);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_to_payload(&self, id: Uuid, key: &str, item: Value) -> Result<bool, AppError> {
        let mut inner = self.lock();
        let Some(entry) = inner.entries.get_mut(&id) else {
            return Ok(false);
        };
        if entry.status != QueueStatus::Queued {
            return Ok(false);
        }

        if !entry.payload.is_object() {
            entry.payload = Value::Object(Default::default());
        }
        if let Value::Object(map) = &mut entry.payload {
            match map.get_mut(key) {
                Some(Value::Array(items)) => items.push(item),
                Some(other) => {
                    let previous = other.take();
                    *other = Value::Array(vec![previous, item]);
                }
                None => {
                    map.insert(key.to_string(), Value::Array(vec![item]));
                }
            }
        }
        Ok(true)
    }

    async fn query_due(
        &self,
        notification_type: Option<NotificationType>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, AppError> {
        let mut due: Vec<QueueEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.is_due(now))
            .filter(|e| notification_type.is_none_or(|t| e.notification_type == t))
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.scheduled_for, e.queued_at));
        Ok(due)
    }

    async fn count_status(
        &self,
        user_id: Uuid,
        status: QueueStatus,
        range: TimeRange,
    ) -> Result<u32, AppError> {
        let count = self
            .lock()
            .entries
            .values()
            .filter(|e| {
                e.user_id == user_id && e.status == status && range.contains(activity_instant(e))
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count_committed(
        &self,
        user_id: Uuid,
        range: TimeRange,
        exclude: Uuid,
    ) -> Result<u32, AppError> {
        let count = self
            .lock()
            .entries
            .values()
            .filter(|e| {
                e.id != exclude
                    && e.user_id == user_id
                    && matches!(e.status, QueueStatus::Sent | QueueStatus::Processing)
                    && range.contains(activity_instant(e))
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn status_counts(&self) -> Result<QueueStats, AppError> {
        let mut stats = QueueStats::default();
        for entry in self.lock().entries.values() {
            stats.record(entry.status, 1);
        }
        Ok(stats)
    }

    async fn find_stuck(&self, cutoff: DateTime<Utc>) -> Result<Vec<QueueEntry>, AppError> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|e| e.status == QueueStatus::Processing && activity_instant(e) < cutoff)
            .cloned()
            .collect())
    }

    async fn mark_phase_run(&self, phase: Phase, window_key: &str) -> Result<bool, AppError> {
        Ok(self
            .lock()
            .phase_runs
            .insert((phase, window_key.to_string())))
    }

    async fn clear_phase_run(&self, phase: Phase, window_key: &str) -> Result<(), AppError> {
        self.lock()
            .phase_runs
            .remove(&(phase, window_key.to_string()));
        Ok(())
    }
}
