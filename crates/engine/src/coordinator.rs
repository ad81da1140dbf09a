//! Tick coordinator: the single periodic entry point.
//!
//! A tick never sleeps, loops or fails. Overlapping ticks are safe: dispatch
//! is guarded by the store's claim and one-shot phases by a per-window marker.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pastime_common::types::NotificationType;

use crate::collaborators::{ActivityTracker, WeeklyStatsSupplier};
use crate::dispatch::{DispatchEngine, DispatchSummary};
use crate::queue::NotificationQueue;
use crate::reaper::{ReapSummary, Reaper};
use crate::store::QueueStore;
use crate::window::{Phase, WindowScheduler};

/// Everything one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub phases: BTreeSet<Phase>,
    pub reclaimed: ReapSummary,
    pub dispatch: DispatchSummary,
    /// WeeklySummary entries queued by the generation phase.
    pub weekly_queued: u32,
    /// ReEngagement entries queued by the inactivity scan.
    pub reengagement_queued: u32,
    /// Collaborator failures that cut a phase short.
    pub errors: Vec<String>,
}

pub struct TickCoordinator {
    store: Arc<dyn QueueStore>,
    windows: WindowScheduler,
    dispatcher: DispatchEngine,
    reaper: Reaper,
    queue: Arc<NotificationQueue>,
    weekly_stats: Arc<dyn WeeklyStatsSupplier>,
    activity: Arc<dyn ActivityTracker>,
    inactivity_thresholds: Vec<u32>,
}

impl TickCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn QueueStore>,
        windows: WindowScheduler,
        dispatcher: DispatchEngine,
        reaper: Reaper,
        queue: Arc<NotificationQueue>,
        weekly_stats: Arc<dyn WeeklyStatsSupplier>,
        activity: Arc<dyn ActivityTracker>,
        inactivity_thresholds: Vec<u32>,
    ) -> Self {
        Self {
            store,
            windows,
            dispatcher,
            reaper,
            queue,
            weekly_stats,
            activity,
            inactivity_thresholds,
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.run(now, true).await
    }

    /// Tick at an instant supplied by the caller rather than the clock.
    /// Stuck-entry reclaim is skipped: `now` may be ahead of sends that are
    /// still in flight.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        self.run(now, false).await
    }

    async fn run(&self, now: DateTime<Utc>, reclaim: bool) -> TickReport {
        let phases = self.windows.compute_active_phases(now);
        let mut report = TickReport {
            at: now,
            phases: phases.clone(),
            ..TickReport::default()
        };

        if reclaim {
            report.reclaimed = self.reaper.reclaim(now).await;
        }

        for notification_type in [NotificationType::StreakMilestone, NotificationType::ReEngagement]
        {
            let summary = self
                .dispatcher
                .process_due(Some(notification_type), now)
                .await;
            report.dispatch.merge(summary);
        }

        if phases.contains(&Phase::DailyDigest) {
            let summary = self
                .dispatcher
                .process_due(Some(NotificationType::AchievementDigest), now)
                .await;
            report.dispatch.merge(summary);
        }

        if phases.contains(&Phase::WeeklyGenerate) {
            if let Some(key) = self.claim_window(Phase::WeeklyGenerate, now, &mut report).await {
                self.generate_weekly(&key, now, &mut report).await;
            }
        }

        if phases.contains(&Phase::WeeklySend) {
            let summary = self
                .dispatcher
                .process_due(Some(NotificationType::WeeklySummary), now)
                .await;
            report.dispatch.merge(summary);
        }

        if phases.contains(&Phase::InactivityScan) {
            if let Some(key) = self.claim_window(Phase::InactivityScan, now, &mut report).await {
                self.scan_inactivity(&key, now, &mut report).await;
            }
        }

        report.dispatch.merge(self.dispatcher.process_retries(now).await);

        tracing::info!(
            phases = ?phases,
            processed = report.dispatch.processed,
            sent = report.dispatch.sent,
            failed = report.dispatch.failed,
            retried = report.dispatch.retried,
            rate_limited = report.dispatch.rate_limited,
            deferred = report.dispatch.deferred,
            skipped = report.dispatch.skipped,
            requeued = report.reclaimed.requeued,
            weekly_queued = report.weekly_queued,
            reengagement_queued = report.reengagement_queued,
            "Tick complete"
        );
        report
    }

    /// First tick in a one-shot phase window wins; the rest skip it.
    /// Returns the window key when this tick owns the window.
    async fn claim_window(
        &self,
        phase: Phase,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Option<String> {
        let key = self.windows.window_key(phase, now);
        match self.store.mark_phase_run(phase, &key).await {
            Ok(true) => Some(key),
            Ok(false) => {
                tracing::debug!(phase = %phase, window = %key, "Phase already ran in this window");
                None
            }
            Err(e) => {
                tracing::error!(phase = %phase, error = %e, "Failed to mark phase run");
                report.errors.push(format!("{phase}: {e}"));
                None
            }
        }
    }

    /// Hands a claimed window back so a later tick in the same band retries it.
    async fn release_window(&self, phase: Phase, key: &str, report: &mut TickReport) {
        if let Err(e) = self.store.clear_phase_run(phase, key).await {
            tracing::error!(phase = %phase, window = %key, error = %e, "Failed to release phase window");
            report.errors.push(format!("{phase}: {e}"));
        }
    }

    async fn generate_weekly(&self, key: &str, now: DateTime<Utc>, report: &mut TickReport) {
        let week = self.windows.previous_week(now);
        let week_start = self.windows.calendar().date_of(week.start);

        let reports = match self.weekly_stats.weekly_reports(week).await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!(error = %e, "Weekly stats unavailable");
                report.errors.push(format!("{}: {e}", Phase::WeeklyGenerate));
                self.release_window(Phase::WeeklyGenerate, key, report).await;
                return;
            }
        };

        for weekly in &reports {
            match self
                .queue
                .queue_at(
                    weekly.user_id,
                    NotificationType::WeeklySummary,
                    weekly.to_payload(week_start),
                    now,
                )
                .await
            {
                Ok(result) if result.queued => report.weekly_queued += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(user_id = %weekly.user_id, error = %e, "Failed to queue weekly summary");
                    report.errors.push(format!("{}: {e}", Phase::WeeklyGenerate));
                }
            }
        }

        tracing::info!(
            users = reports.len(),
            queued = report.weekly_queued,
            week_start = %week_start,
            "Weekly summaries generated"
        );
    }

    async fn scan_inactivity(&self, key: &str, now: DateTime<Utc>, report: &mut TickReport) {
        let today = self.windows.calendar().day_of(now);

        // Every threshold is fetched before anything is queued so a tracker
        // failure leaves the window unclaimed and nothing half-done.
        let mut inactive = Vec::with_capacity(self.inactivity_thresholds.len());
        for &days in &self.inactivity_thresholds {
            match self.activity.users_inactive_for(days, today).await {
                Ok(users) => inactive.push((days, users)),
                Err(e) => {
                    tracing::error!(days, error = %e, "Activity tracker unavailable");
                    report.errors.push(format!("{}: {e}", Phase::InactivityScan));
                    self.release_window(Phase::InactivityScan, key, report).await;
                    return;
                }
            }
        }

        for (days, users) in inactive {
            for user_id in users {
                match self
                    .queue
                    .queue_at(
                        user_id,
                        NotificationType::ReEngagement,
                        serde_json::json!({ "days_inactive": days }),
                        now,
                    )
                    .await
                {
                    Ok(result) if result.queued => report.reengagement_queued += 1,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(user_id = %user_id, error = %e, "Failed to queue re-engagement");
                        report.errors.push(format!("{}: {e}", Phase::InactivityScan));
                    }
                }
            }
        }
    }
}
