//! Dispatch/retry engine.
//!
//! For each due entry:
//! 1. Claim it (`Queued -> Processing`); a lost claim means another tick owns it
//! 2. Reserve daily capacity; a cap filled by completed sends is terminal
//!    `RateLimited`, a cap filled only by sends still in flight puts the entry
//!    back in the queue untouched
//! 3. Send through the mail transport under a timeout
//! 4. Record `Sent`, or classify the failure and either reschedule with linear
//!    backoff or mark `Failed`
//!
//! Nothing here returns an error. Every outcome is written to the entry and
//! reported in the [`DispatchSummary`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pastime_common::error::{DeliveryError, FailureKind};
use pastime_common::mail::{MailTransport, OutgoingMail};
use pastime_common::types::{NotificationType, QueueEntry, QueueEntryPatch, QueueStatus};

use crate::collaborators::RecipientDirectory;
use crate::message;
use crate::rate_limit::{RateLimiter, Reservation};
use crate::store::QueueStore;

/// Outcome for a single claimed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub entry_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    /// Status the entry was left in.
    pub status: QueueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Entries this run claimed.
    pub processed: u32,
    pub sent: u32,
    /// Entries moved to `Failed`.
    pub failed: u32,
    /// Entries rescheduled for another attempt.
    pub retried: u32,
    pub rate_limited: u32,
    /// Claimed entries handed back because other in-flight sends held the
    /// user's remaining capacity.
    pub deferred: u32,
    /// Due entries not claimed by this run.
    pub skipped: u32,
    pub results: Vec<DispatchResult>,
}

impl DispatchSummary {
    pub fn merge(&mut self, other: DispatchSummary) {
        self.processed += other.processed;
        self.sent += other.sent;
        self.failed += other.failed;
        self.retried += other.retried;
        self.rate_limited += other.rate_limited;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.results.extend(other.results);
    }

    fn record(&mut self, entry: &QueueEntry, status: QueueStatus, error: Option<&Failure>) {
        self.results.push(DispatchResult {
            entry_id: entry.id,
            user_id: entry.user_id,
            notification_type: entry.notification_type,
            status,
            error_kind: error.map(|e| e.kind),
            error: error.map(|e| e.message.clone()),
        });
    }
}

/// A classified failure ready to be written to `last_error`.
#[derive(Debug, Clone)]
struct Failure {
    kind: FailureKind,
    message: String,
    retryable: bool,
}

impl Failure {
    fn rate_limited(cap: u32) -> Self {
        Self {
            kind: FailureKind::RateLimited,
            message: format!("daily cap of {cap} reached"),
            retryable: false,
        }
    }

    fn stored(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

impl From<DeliveryError> for Failure {
    fn from(err: DeliveryError) -> Self {
        let message = match &err {
            DeliveryError::Transient(m) | DeliveryError::Permanent(m) | DeliveryError::Unknown(m) => {
                m.clone()
            }
        };
        Self {
            kind: err.kind(),
            retryable: err.is_retryable(),
            message,
        }
    }
}

pub struct DispatchEngine {
    store: Arc<dyn QueueStore>,
    limiter: Arc<dyn RateLimiter>,
    transport: Arc<dyn MailTransport>,
    recipients: Arc<dyn RecipientDirectory>,
    send_timeout: std::time::Duration,
    retry_backoff: Duration,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: Arc<dyn RateLimiter>,
        transport: Arc<dyn MailTransport>,
        recipients: Arc<dyn RecipientDirectory>,
        send_timeout: std::time::Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            limiter,
            transport,
            recipients,
            send_timeout,
            retry_backoff,
        }
    }

    /// Dispatch every entry due at `now`, optionally restricted to one type.
    pub async fn process_due(
        &self,
        notification_type: Option<NotificationType>,
        now: DateTime<Utc>,
    ) -> DispatchSummary {
        match self.store.query_due(notification_type, now).await {
            Ok(due) => self.dispatch_all(due, now).await,
            Err(e) => {
                tracing::error!(
                    notification_type = ?notification_type,
                    error = %e,
                    "Failed to load due entries"
                );
                DispatchSummary::default()
            }
        }
    }

    /// Dispatch windowed entries that are waiting out a retry backoff. Their
    /// canonical window has already passed, so the phase dispatch would not
    /// pick them up until the next day or week.
    pub async fn process_retries(&self, now: DateTime<Utc>) -> DispatchSummary {
        match self.store.query_due(None, now).await {
            Ok(due) => {
                let retries = due
                    .into_iter()
                    .filter(|e| !e.notification_type.is_immediate() && e.attempts > 0)
                    .collect();
                self.dispatch_all(retries, now).await
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load retry candidates");
                DispatchSummary::default()
            }
        }
    }

    async fn dispatch_all(&self, entries: Vec<QueueEntry>, now: DateTime<Utc>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for entry in entries {
            self.dispatch_one(entry, now, &mut summary).await;
        }
        summary
    }

    async fn dispatch_one(
        &self,
        entry: QueueEntry,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) {
        match self.store.claim(entry.id, now).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(entry_id = %entry.id, "Entry already claimed, skipping");
                summary.skipped += 1;
                return;
            }
            Err(e) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Claim failed");
                summary.skipped += 1;
                return;
            }
        }
        summary.processed += 1;

        match self.limiter.reserve(entry.user_id, entry.id, now).await {
            Ok(Reservation::Granted) => {}
            Ok(Reservation::Contended) => {
                self.finish(&entry, QueueEntryPatch::status(QueueStatus::Queued))
                    .await;
                tracing::debug!(
                    entry_id = %entry.id,
                    user_id = %entry.user_id,
                    "Capacity held by sends in flight, entry requeued"
                );
                summary.deferred += 1;
                summary.record(&entry, QueueStatus::Queued, None);
                return;
            }
            Ok(Reservation::Exhausted) => {
                let failure = Failure::rate_limited(self.limiter.daily_cap());
                let patch = QueueEntryPatch::status(QueueStatus::RateLimited).error(failure.stored());
                self.finish(&entry, patch).await;
                tracing::info!(
                    entry_id = %entry.id,
                    user_id = %entry.user_id,
                    notification_type = %entry.notification_type,
                    "Daily cap reached, notification dropped"
                );
                summary.rate_limited += 1;
                summary.record(&entry, QueueStatus::RateLimited, Some(&failure));
                return;
            }
            Err(e) => {
                let failure = Failure::from(DeliveryError::Unknown(format!(
                    "rate limiter unavailable: {e}"
                )));
                self.fail_attempt(&entry, failure, now, summary).await;
                return;
            }
        }

        match self.deliver(&entry).await {
            Ok(()) => {
                let patch = QueueEntryPatch::status(QueueStatus::Sent)
                    .attempts(entry.attempts + 1)
                    .attempted_at(now)
                    .clear_error();
                self.finish(&entry, patch).await;
                if let Err(e) = self.limiter.record_sent(entry.user_id, now).await {
                    tracing::warn!(user_id = %entry.user_id, error = %e, "Failed to record sent count");
                }
                tracing::info!(
                    entry_id = %entry.id,
                    user_id = %entry.user_id,
                    notification_type = %entry.notification_type,
                    "Notification sent"
                );
                summary.sent += 1;
                summary.record(&entry, QueueStatus::Sent, None);
            }
            Err(err) => {
                if let Err(e) = self.limiter.release(entry.user_id, now).await {
                    tracing::warn!(user_id = %entry.user_id, error = %e, "Failed to release send capacity");
                }
                self.fail_attempt(&entry, Failure::from(err), now, summary).await;
            }
        }
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DeliveryError> {
        let to = match self.recipients.email_for(entry.user_id).await {
            Ok(Some(to)) => to,
            Ok(None) => {
                return Err(DeliveryError::Permanent(
                    "no email address on file".to_string(),
                ));
            }
            Err(e) => {
                return Err(DeliveryError::Unknown(format!(
                    "recipient lookup failed: {e}"
                )));
            }
        };

        let composed = message::compose(entry);
        let mail = OutgoingMail {
            to,
            subject: composed.subject,
            body: composed.body,
        };

        match tokio::time::timeout(self.send_timeout, self.transport.send(&mail)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Transient(format!(
                "send timed out after {}s",
                self.send_timeout.as_secs()
            ))),
        }
    }

    async fn fail_attempt(
        &self,
        entry: &QueueEntry,
        failure: Failure,
        now: DateTime<Utc>,
        summary: &mut DispatchSummary,
    ) {
        let attempts = entry.attempts + 1;

        if !failure.retryable || attempts >= entry.max_attempts {
            let patch = QueueEntryPatch::status(QueueStatus::Failed)
                .attempts(attempts)
                .attempted_at(now)
                .error(failure.stored());
            self.finish(entry, patch).await;
            tracing::warn!(
                entry_id = %entry.id,
                user_id = %entry.user_id,
                attempts,
                kind = %failure.kind,
                error = %failure.message,
                "Notification failed permanently"
            );
            summary.failed += 1;
            summary.record(entry, QueueStatus::Failed, Some(&failure));
            return;
        }

        let retry_at = now + self.retry_backoff * attempts;
        let patch = QueueEntryPatch::status(QueueStatus::Queued)
            .attempts(attempts)
            .attempted_at(now)
            .scheduled_for(retry_at)
            .error(failure.stored());
        self.finish(entry, patch).await;
        tracing::warn!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            attempts,
            retry_at = %retry_at,
            kind = %failure.kind,
            error = %failure.message,
            "Delivery failed, retry scheduled"
        );
        summary.retried += 1;
        summary.record(entry, QueueStatus::Queued, Some(&failure));
    }

    /// Move a claimed entry out of `Processing`. A miss means the reaper got
    /// there first; the entry keeps whatever state it assigned.
    async fn finish(&self, entry: &QueueEntry, patch: QueueEntryPatch) {
        match self
            .store
            .update_if(entry.id, QueueStatus::Processing, &patch)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                entry_id = %entry.id,
                "Entry left processing before its outcome was recorded"
            ),
            Err(e) => tracing::error!(
                entry_id = %entry.id,
                error = %e,
                "Failed to record dispatch outcome"
            ),
        }
    }
}
