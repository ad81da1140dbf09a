//! Reclaims entries stuck in `Processing` after a crash mid-send.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use pastime_common::error::FailureKind;
use pastime_common::types::{QueueEntryPatch, QueueStatus};

use crate::store::QueueStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapSummary {
    /// Entries returned to `Queued`.
    pub requeued: u32,
    /// Entries that ran out of attempts.
    pub failed: u32,
}

pub struct Reaper {
    store: Arc<dyn QueueStore>,
    stuck_after: Duration,
}

impl Reaper {
    pub fn new(store: Arc<dyn QueueStore>, stuck_after: Duration) -> Self {
        Self { store, stuck_after }
    }

    /// Each abandoned claim counts as an attempt, so an entry that keeps
    /// crashing the sender still terminates at `max_attempts`.
    pub async fn reclaim(&self, now: DateTime<Utc>) -> ReapSummary {
        let mut summary = ReapSummary::default();

        let stuck = match self.store.find_stuck(now - self.stuck_after).await {
            Ok(stuck) => stuck,
            Err(e) => {
                tracing::error!(error = %e, "Failed to scan for stuck entries");
                return summary;
            }
        };

        for entry in stuck {
            let attempts = (entry.attempts + 1).min(entry.max_attempts);
            let exhausted = attempts >= entry.max_attempts;
            let message = format!(
                "{}: abandoned in processing since {}",
                FailureKind::Unknown,
                entry.last_attempt_at.unwrap_or(entry.queued_at)
            );

            let patch = if exhausted {
                QueueEntryPatch::status(QueueStatus::Failed)
                    .attempts(attempts)
                    .error(message)
            } else {
                QueueEntryPatch::status(QueueStatus::Queued)
                    .attempts(attempts)
                    .scheduled_for(now.max(entry.scheduled_for))
                    .error(message)
            };

            match self
                .store
                .update_if(entry.id, QueueStatus::Processing, &patch)
                .await
            {
                Ok(true) if exhausted => {
                    tracing::warn!(entry_id = %entry.id, attempts, "Stuck entry failed");
                    summary.failed += 1;
                }
                Ok(true) => {
                    tracing::warn!(entry_id = %entry.id, attempts, "Stuck entry requeued");
                    summary.requeued += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(entry_id = %entry.id, error = %e, "Failed to reclaim entry");
                }
            }
        }

        summary
    }
}
