//! End-to-end scheduler behaviour against the in-memory store and fake
//! collaborators. No database required.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use pastime_common::error::{AppError, DeliveryError, FailureKind};
use pastime_common::mail::{MailTransport, OutgoingMail};
use pastime_common::types::{NotificationType, QueueEntry, QueueStatus, TimeRange};
use pastime_engine::clock::ManualClock;
use pastime_engine::collaborators::{
    ActivityTracker, Permission, PermissionOracle, RecipientDirectory, WeeklyReport,
    WeeklyStatsSupplier,
};
use pastime_engine::config::SchedulerConfig;
use pastime_engine::store::{InMemoryQueueStore, QueueStore};
use pastime_engine::window::Phase;
use pastime_engine::{Collaborators, NotificationScheduler};

// ============================================================
// Fakes
// ============================================================

#[derive(Default)]
struct FakeOracle {
    no_marketing_consent: HashSet<Uuid>,
}

#[async_trait]
impl PermissionOracle for FakeOracle {
    async fn can_send(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
    ) -> Result<Permission, AppError> {
        if notification_type == NotificationType::ReEngagement
            && self.no_marketing_consent.contains(&user_id)
        {
            return Ok(Permission::deny("no marketing consent"));
        }
        Ok(Permission::allow())
    }
}

/// Records delivered mail. While `failure` is set every send fails with it.
#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<OutgoingMail>>,
    failure: Mutex<Option<DeliveryError>>,
    calls: Mutex<u32>,
}

impl RecordingTransport {
    fn fail_with(&self, err: Option<DeliveryError>) {
        *self.failure.lock().unwrap() = err;
    }

    fn delivered(&self) -> Vec<OutgoingMail> {
        self.delivered.lock().unwrap().clone()
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        *self.calls.lock().unwrap() += 1;
        tokio::task::yield_now().await;
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.delivered.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

struct FakeDirectory;

#[async_trait]
impl RecipientDirectory for FakeDirectory {
    async fn email_for(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        Ok(Some(format!("{user_id}@example.com")))
    }
}

/// Takes one from `failures` if non-zero and reports whether it did.
fn take_failure(failures: &Mutex<u32>) -> bool {
    let mut left = failures.lock().unwrap();
    if *left == 0 {
        return false;
    }
    *left -= 1;
    true
}

/// The first `failures` calls fail.
#[derive(Default)]
struct FakeWeeklyStats {
    reports: Vec<WeeklyReport>,
    calls: Mutex<Vec<TimeRange>>,
    failures: Mutex<u32>,
}

#[async_trait]
impl WeeklyStatsSupplier for FakeWeeklyStats {
    async fn weekly_reports(&self, week: TimeRange) -> Result<Vec<WeeklyReport>, AppError> {
        self.calls.lock().unwrap().push(week);
        if take_failure(&self.failures) {
            return Err(AppError::Internal("stats service unavailable".into()));
        }
        Ok(self.reports.clone())
    }
}

#[derive(Default)]
struct FakeActivity {
    inactive: HashMap<u32, Vec<Uuid>>,
    failures: Mutex<u32>,
}

#[async_trait]
impl ActivityTracker for FakeActivity {
    async fn users_inactive_for(
        &self,
        days: u32,
        _today: TimeRange,
    ) -> Result<Vec<Uuid>, AppError> {
        if take_failure(&self.failures) {
            return Err(AppError::Internal("activity service unavailable".into()));
        }
        Ok(self.inactive.get(&days).cloned().unwrap_or_default())
    }
}

// ============================================================
// Harness
// ============================================================

struct Harness {
    store: Arc<InMemoryQueueStore>,
    transport: Arc<RecordingTransport>,
    weekly: Arc<FakeWeeklyStats>,
    clock: Arc<ManualClock>,
    scheduler: Arc<NotificationScheduler>,
}

impl Harness {
    fn new(now: DateTime<Utc>) -> Self {
        Self::with(now, FakeOracle::default(), FakeWeeklyStats::default(), FakeActivity::default())
    }

    fn with(
        now: DateTime<Utc>,
        oracle: FakeOracle,
        weekly: FakeWeeklyStats,
        activity: FakeActivity,
    ) -> Self {
        let store = Arc::new(InMemoryQueueStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let weekly = Arc::new(weekly);
        let clock = Arc::new(ManualClock::new(now));

        let scheduler = NotificationScheduler::new(
            SchedulerConfig::default(),
            Collaborators {
                store: store.clone(),
                oracle: Arc::new(oracle),
                transport: transport.clone(),
                recipients: Arc::new(FakeDirectory),
                weekly_stats: weekly.clone(),
                activity: Arc::new(activity),
                limiter: None,
                clock: Some(clock.clone()),
            },
        );

        Self {
            store,
            transport,
            weekly,
            clock,
            scheduler: Arc::new(scheduler),
        }
    }

    async fn queue(
        &self,
        at: DateTime<Utc>,
        user_id: Uuid,
        notification_type: NotificationType,
        payload: serde_json::Value,
    ) -> pastime_engine::queue::QueueResult {
        self.clock.set(at);
        self.scheduler
            .queue_notification(user_id, notification_type, payload)
            .await
            .unwrap()
    }

    async fn entry(&self, id: Uuid) -> QueueEntry {
        self.store.get(id).await.unwrap().unwrap()
    }

    fn entries_of(&self, notification_type: NotificationType) -> Vec<QueueEntry> {
        self.store
            .snapshot()
            .into_iter()
            .filter(|e| e.notification_type == notification_type)
            .collect()
    }
}

/// 2026-10-14 is a Wednesday.
fn wed(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, h, m, 0).unwrap()
}

/// 2026-10-18 is a Sunday.
fn sun(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, h, m, 0).unwrap()
}

// ============================================================
// Scenarios
// ============================================================

#[tokio::test]
async fn test_achievement_in_afternoon_scheduled_same_evening() {
    let h = Harness::new(wed(14, 0));
    let result = h
        .queue(wed(14, 0), Uuid::new_v4(), NotificationType::AchievementDigest, json!({ "title": "First Hour" }))
        .await;

    assert!(result.queued);
    let entry = h.entry(result.entry_id.unwrap()).await;
    assert_eq!(entry.scheduled_for, wed(20, 0));
    assert_eq!(entry.status, QueueStatus::Queued);
}

#[tokio::test]
async fn test_achievement_after_window_scheduled_next_evening() {
    let h = Harness::new(wed(20, 3));
    let result = h
        .queue(wed(20, 3), Uuid::new_v4(), NotificationType::AchievementDigest, json!({ "title": "Night Owl" }))
        .await;

    let entry = h.entry(result.entry_id.unwrap()).await;
    assert_eq!(entry.scheduled_for, wed(20, 0) + Duration::days(1));
}

#[tokio::test]
async fn test_two_achievements_same_day_make_one_digest() {
    let h = Harness::new(wed(9, 0));
    let user = Uuid::new_v4();
    h.queue(wed(9, 0), user, NotificationType::AchievementDigest, json!({ "title": "A" }))
        .await;
    h.queue(wed(17, 45), user, NotificationType::AchievementDigest, json!({ "title": "B" }))
        .await;

    let digests = h.entries_of(NotificationType::AchievementDigest);
    assert_eq!(digests.len(), 1);
    assert_eq!(
        digests[0].payload,
        json!({ "achievements": [{ "title": "A" }, { "title": "B" }] })
    );
}

#[tokio::test]
async fn test_third_digest_rejected_when_two_sent_today() {
    let h = Harness::new(wed(10, 0));
    let user = Uuid::new_v4();
    h.queue(wed(10, 0), user, NotificationType::StreakMilestone, json!({ "streak_days": 7 }))
        .await;
    h.queue(wed(10, 0), user, NotificationType::StreakMilestone, json!({ "streak_days": 14 }))
        .await;
    let report = h.scheduler.tick(wed(10, 5)).await;
    assert_eq!(report.dispatch.sent, 2);

    let result = h
        .queue(wed(11, 0), user, NotificationType::AchievementDigest, json!({ "title": "C" }))
        .await;
    assert!(!result.queued);
    assert_eq!(result.reason, Some(FailureKind::RateLimited));
    assert!(h.entries_of(NotificationType::AchievementDigest).is_empty());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["queued"], false);
    assert_eq!(json["reason"], "RateLimited");
}

#[tokio::test]
async fn test_three_transient_failures_end_in_failed() {
    let h = Harness::new(wed(10, 0));
    h.transport
        .fail_with(Some(DeliveryError::Transient("connection refused".into())));
    let result = h
        .queue(wed(10, 0), Uuid::new_v4(), NotificationType::StreakMilestone, json!({ "streak_days": 3 }))
        .await;
    let id = result.entry_id.unwrap();

    // attempt 1 at 10:05, retry in 1h
    h.scheduler.tick(wed(10, 5)).await;
    let entry = h.entry(id).await;
    assert_eq!((entry.status, entry.attempts), (QueueStatus::Queued, 1));
    assert_eq!(entry.scheduled_for, wed(11, 5));

    // attempt 2 at 11:05, retry in 2h
    h.scheduler.tick(wed(11, 5)).await;
    let entry = h.entry(id).await;
    assert_eq!((entry.status, entry.attempts), (QueueStatus::Queued, 2));
    assert_eq!(entry.scheduled_for, wed(13, 5));

    // attempt 3 exhausts the budget
    h.scheduler.tick(wed(13, 5)).await;
    let entry = h.entry(id).await;
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.attempts, 3);
    assert_eq!(entry.scheduled_for, wed(13, 5));
    assert!(entry.last_error.unwrap().contains("connection refused"));

    // nothing changes afterwards
    h.transport.fail_with(None);
    h.scheduler.tick(wed(18, 0)).await;
    let after = h.entry(id).await;
    assert_eq!(after.status, QueueStatus::Failed);
    assert_eq!(after.scheduled_for, wed(13, 5));
    assert_eq!(h.transport.calls(), 3);
}

#[tokio::test]
async fn test_back_to_back_ticks_send_once() {
    let h = Harness::new(wed(10, 0));
    let result = h
        .queue(wed(10, 0), Uuid::new_v4(), NotificationType::StreakMilestone, json!({ "streak_days": 5 }))
        .await;

    let first = h.scheduler.tick(wed(10, 5)).await;
    let second = h.scheduler.tick(wed(10, 5)).await;

    assert_eq!(first.dispatch.sent, 1);
    assert_eq!(second.dispatch.processed, 0);
    assert_eq!(h.transport.delivered().len(), 1);
    assert_eq!(h.entry(result.entry_id.unwrap()).await.status, QueueStatus::Sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_ticks_never_double_send() {
    let h = Harness::new(wed(10, 0));
    let mut users = Vec::new();
    for _ in 0..20 {
        let user = Uuid::new_v4();
        users.push(user);
        h.queue(wed(10, 0), user, NotificationType::StreakMilestone, json!({ "streak_days": 5 }))
            .await;
    }

    let ticks: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = h.scheduler.clone();
            tokio::spawn(async move { scheduler.tick(wed(10, 5)).await })
        })
        .collect();

    let mut sent = 0;
    for tick in ticks {
        sent += tick.await.unwrap().dispatch.sent;
    }

    assert_eq!(sent, 20);
    let delivered = h.transport.delivered();
    assert_eq!(delivered.len(), 20);
    let recipients: HashSet<_> = delivered.iter().map(|m| m.to.clone()).collect();
    assert_eq!(recipients.len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_ticks_respect_cap_for_one_user() {
    for _ in 0..20 {
        let h = Harness::new(wed(10, 0));
        let user = Uuid::new_v4();
        for days in 0..4 {
            h.queue(wed(10, 0), user, NotificationType::StreakMilestone, json!({ "streak_days": days }))
                .await;
        }

        let ticks: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = h.scheduler.clone();
                tokio::spawn(async move { scheduler.tick(wed(10, 5)).await })
            })
            .collect();
        let mut sent = 0;
        for tick in ticks {
            sent += tick.await.unwrap().dispatch.sent;
        }
        assert!(sent <= 2, "cap exceeded: {sent}");
        assert!(h.transport.delivered().len() <= 2);

        // entries handed back under contention are settled by the next tick
        h.scheduler.tick(wed(10, 10)).await;
        let entries = h.store.snapshot();
        let sent = entries.iter().filter(|e| e.status == QueueStatus::Sent).count();
        let limited = entries
            .iter()
            .filter(|e| e.status == QueueStatus::RateLimited)
            .count();
        assert_eq!(sent, 2);
        assert_eq!(limited, 2);
        assert_eq!(h.transport.delivered().len(), 2);
    }
}

// ============================================================
// Properties
// ============================================================

#[tokio::test]
async fn test_sent_per_user_per_day_never_exceeds_cap() {
    let h = Harness::new(wed(9, 0));
    let user = Uuid::new_v4();
    for i in 0..5 {
        let result = h
            .queue(wed(9, i), user, NotificationType::StreakMilestone, json!({ "streak_days": i }))
            .await;
        // immediate class is admitted even past the cap
        assert!(result.queued);
    }

    let report = h.scheduler.tick(wed(9, 10)).await;
    assert_eq!(report.dispatch.sent, 2);
    assert_eq!(report.dispatch.rate_limited, 3);

    let limited: Vec<_> = h
        .store
        .snapshot()
        .into_iter()
        .filter(|e| e.status == QueueStatus::RateLimited)
        .collect();
    assert_eq!(limited.len(), 3);
    // dropped, not deferred
    h.scheduler.tick(wed(9, 10) + Duration::days(1)).await;
    assert_eq!(h.transport.delivered().len(), 2);
}

#[tokio::test]
async fn test_attempts_never_exceed_max() {
    let h = Harness::new(wed(10, 0));
    h.transport
        .fail_with(Some(DeliveryError::Unknown("weird".into())));
    for _ in 0..3 {
        h.queue(wed(10, 0), Uuid::new_v4(), NotificationType::ReEngagement, json!({ "days_inactive": 14 }))
            .await;
    }

    let mut now = wed(10, 5);
    while now < wed(23, 55) {
        h.scheduler.tick(now).await;
        for entry in h.store.snapshot() {
            assert!(entry.attempts <= entry.max_attempts);
        }
        now += Duration::minutes(5);
    }
    assert!(h.store.snapshot().iter().all(|e| e.status == QueueStatus::Failed));
}

#[tokio::test]
async fn test_many_achievements_one_digest_per_user_per_day() {
    let h = Harness::new(wed(0, 0));
    let users = [Uuid::new_v4(), Uuid::new_v4()];
    for hour in 6..20 {
        for user in users {
            h.queue(wed(hour, 30), user, NotificationType::AchievementDigest, json!({ "title": format!("h{hour}") }))
                .await;
        }
    }

    let digests = h.entries_of(NotificationType::AchievementDigest);
    assert_eq!(digests.len(), 2);
    for digest in digests {
        assert_eq!(digest.scheduled_for, wed(20, 0));
        assert_eq!(digest.payload["achievements"].as_array().unwrap().len(), 14);
    }
}

#[tokio::test]
async fn test_digest_sent_only_in_evening_window() {
    let h = Harness::new(wed(14, 0));
    let user = Uuid::new_v4();
    h.queue(wed(14, 0), user, NotificationType::AchievementDigest, json!({ "title": "A" }))
        .await;
    h.queue(wed(15, 0), user, NotificationType::AchievementDigest, json!({ "title": "B" }))
        .await;

    let before = h.scheduler.tick(wed(19, 55)).await;
    assert!(!before.phases.contains(&Phase::DailyDigest));
    assert_eq!(before.dispatch.sent, 0);

    let during = h.scheduler.tick(wed(20, 1)).await;
    assert!(during.phases.contains(&Phase::DailyDigest));
    assert_eq!(during.dispatch.sent, 1);

    let mail = &h.transport.delivered()[0];
    assert_eq!(mail.subject, "You unlocked 2 achievements today");
}

#[tokio::test]
async fn test_digest_missing_its_window_waits_for_next_one() {
    let h = Harness::new(wed(14, 0));
    h.queue(wed(14, 0), Uuid::new_v4(), NotificationType::AchievementDigest, json!({ "title": "A" }))
        .await;

    let late = h.scheduler.tick(wed(20, 30)).await;
    assert_eq!(late.dispatch.processed, 0);

    let next = h.scheduler.tick(wed(20, 0) + Duration::days(1)).await;
    assert_eq!(next.dispatch.sent, 1);
}

#[tokio::test]
async fn test_failed_digest_retried_outside_window() {
    let h = Harness::new(wed(14, 0));
    let result = h
        .queue(wed(14, 0), Uuid::new_v4(), NotificationType::AchievementDigest, json!({ "title": "A" }))
        .await;

    h.transport
        .fail_with(Some(DeliveryError::Transient("503".into())));
    let first = h.scheduler.tick(wed(20, 0)).await;
    assert_eq!(first.dispatch.retried, 1);

    h.transport.fail_with(None);
    let retry = h.scheduler.tick(wed(21, 1)).await;
    assert!(!retry.phases.contains(&Phase::DailyDigest));
    assert_eq!(retry.dispatch.sent, 1);

    let entry = h.entry(result.entry_id.unwrap()).await;
    assert_eq!(entry.status, QueueStatus::Sent);
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn test_weekly_generated_once_before_send() {
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let report = |user_id: Uuid| WeeklyReport {
        user_id,
        total_minutes: 90,
        sessions: 3,
        active_days: 2,
        top_hobby: Some("pottery".into()),
    };
    let h = Harness::with(
        sun(9, 0),
        FakeOracle::default(),
        FakeWeeklyStats {
            reports: vec![report(alice), report(bob)],
            ..Default::default()
        },
        FakeActivity::default(),
    );

    let generate = h.scheduler.tick(sun(9, 1)).await;
    assert!(generate.phases.contains(&Phase::WeeklyGenerate));
    assert_eq!(generate.weekly_queued, 2);

    // overlapping tick in the same band does not regenerate
    let again = h.scheduler.tick(sun(9, 3)).await;
    assert_eq!(again.weekly_queued, 0);
    assert_eq!(h.weekly.calls.lock().unwrap().len(), 1);

    let summaries = h.entries_of(NotificationType::WeeklySummary);
    assert_eq!(summaries.len(), 2);
    for entry in &summaries {
        assert!(entry.queued_at < entry.scheduled_for);
        assert_eq!(entry.scheduled_for, sun(10, 0));
        assert_eq!(entry.payload["week_start"], "2026-10-11");
    }

    let send = h.scheduler.tick(sun(10, 2)).await;
    assert!(send.phases.contains(&Phase::WeeklySend));
    assert_eq!(send.dispatch.sent, 2);
}

#[tokio::test]
async fn test_inactivity_scan_respects_marketing_consent() {
    let (consenting, declined, lapsed) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let h = Harness::with(
        wed(12, 0),
        FakeOracle {
            no_marketing_consent: HashSet::from([declined]),
        },
        FakeWeeklyStats::default(),
        FakeActivity {
            inactive: HashMap::from([(14, vec![consenting, declined]), (30, vec![lapsed])]),
            ..Default::default()
        },
    );

    let scan = h.scheduler.tick(wed(12, 2)).await;
    assert!(scan.phases.contains(&Phase::InactivityScan));
    assert_eq!(scan.reengagement_queued, 2);

    let again = h.scheduler.tick(wed(12, 4)).await;
    assert_eq!(again.reengagement_queued, 0);

    let queued: HashSet<Uuid> = h
        .entries_of(NotificationType::ReEngagement)
        .iter()
        .map(|e| e.user_id)
        .collect();
    assert_eq!(queued, HashSet::from([consenting, lapsed]));

    let send = h.scheduler.tick(wed(12, 7)).await;
    assert_eq!(send.dispatch.sent, 2);
}

#[tokio::test]
async fn test_weekly_generation_retried_after_supplier_failure() {
    let user = Uuid::new_v4();
    let h = Harness::with(
        sun(9, 0),
        FakeOracle::default(),
        FakeWeeklyStats {
            reports: vec![WeeklyReport {
                user_id: user,
                total_minutes: 45,
                sessions: 1,
                active_days: 1,
                top_hobby: None,
            }],
            failures: Mutex::new(1),
            ..Default::default()
        },
        FakeActivity::default(),
    );

    let failed = h.scheduler.tick(sun(9, 1)).await;
    assert!(failed.phases.contains(&Phase::WeeklyGenerate));
    assert_eq!(failed.weekly_queued, 0);
    assert_eq!(failed.errors.len(), 1);

    // the window was handed back, so the next tick in the band generates
    let retried = h.scheduler.tick(sun(9, 3)).await;
    assert_eq!(retried.weekly_queued, 1);
    assert!(retried.errors.is_empty());
    assert_eq!(h.weekly.calls.lock().unwrap().len(), 2);

    let settled = h.scheduler.tick(sun(9, 5)).await;
    assert_eq!(settled.weekly_queued, 0);
    assert_eq!(h.weekly.calls.lock().unwrap().len(), 2);
    assert_eq!(h.entries_of(NotificationType::WeeklySummary).len(), 1);
}

#[tokio::test]
async fn test_inactivity_scan_retried_after_tracker_failure() {
    let (fortnight, month) = (Uuid::new_v4(), Uuid::new_v4());
    let h = Harness::with(
        wed(12, 0),
        FakeOracle::default(),
        FakeWeeklyStats::default(),
        FakeActivity {
            inactive: HashMap::from([(14, vec![fortnight]), (30, vec![month])]),
            failures: Mutex::new(1),
        },
    );

    let failed = h.scheduler.tick(wed(12, 1)).await;
    assert!(failed.phases.contains(&Phase::InactivityScan));
    assert_eq!(failed.reengagement_queued, 0);
    assert_eq!(failed.errors.len(), 1);
    assert!(h.entries_of(NotificationType::ReEngagement).is_empty());

    let retried = h.scheduler.tick(wed(12, 3)).await;
    assert_eq!(retried.reengagement_queued, 2);

    let again = h.scheduler.tick(wed(12, 5)).await;
    assert_eq!(again.reengagement_queued, 0);
}

#[tokio::test]
async fn test_stuck_processing_entry_reclaimed_by_tick() {
    let h = Harness::new(wed(10, 0));
    let result = h
        .queue(wed(10, 0), Uuid::new_v4(), NotificationType::StreakMilestone, json!({ "streak_days": 2 }))
        .await;
    let id = result.entry_id.unwrap();

    // a sender claimed it and never came back
    assert!(h.store.claim(id, wed(10, 3)).await.unwrap());

    let early = h.scheduler.tick(wed(10, 10)).await;
    assert_eq!(early.reclaimed.requeued, 0);

    let report = h.scheduler.tick(wed(11, 0)).await;
    assert_eq!(report.reclaimed.requeued, 1);
    assert_eq!(report.dispatch.sent, 1);

    let entry = h.entry(id).await;
    assert_eq!(entry.status, QueueStatus::Sent);
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn test_queue_stats_track_lifecycle() {
    let h = Harness::new(wed(10, 0));
    let user = Uuid::new_v4();
    h.queue(wed(10, 0), user, NotificationType::StreakMilestone, json!({}))
        .await;
    h.queue(wed(10, 0), user, NotificationType::AchievementDigest, json!({ "title": "A" }))
        .await;
    h.scheduler.tick(wed(10, 5)).await;

    let stats = h.scheduler.queue_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.failed, 0);
}
