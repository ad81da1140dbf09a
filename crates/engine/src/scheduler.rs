//! Wires the engine components around a set of collaborators.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::mail::MailTransport;
use pastime_common::types::{NotificationType, QueueStats};

use crate::clock::{Clock, LocalCalendar, SystemClock};
use crate::collaborators::{
    ActivityTracker, PermissionOracle, RecipientDirectory, WeeklyStatsSupplier,
};
use crate::config::SchedulerConfig;
use crate::coordinator::{TickCoordinator, TickReport};
use crate::dispatch::DispatchEngine;
use crate::queue::{NotificationQueue, QueueResult};
use crate::rate_limit::{RateLimiter, StoreRateLimiter};
use crate::reaper::Reaper;
use crate::sources::{PgActivityTracker, PgPermissionOracle, PgRecipientDirectory, PgWeeklyStats};
use crate::store::{PgQueueStore, QueueStore};
use crate::window::WindowScheduler;

/// External dependencies of the scheduler.
pub struct Collaborators {
    pub store: Arc<dyn QueueStore>,
    pub oracle: Arc<dyn PermissionOracle>,
    pub transport: Arc<dyn MailTransport>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub weekly_stats: Arc<dyn WeeklyStatsSupplier>,
    pub activity: Arc<dyn ActivityTracker>,
    /// Defaults to counting `Sent` entries in the store.
    pub limiter: Option<Arc<dyn RateLimiter>>,
    /// Defaults to the system clock.
    pub clock: Option<Arc<dyn Clock>>,
}

impl Collaborators {
    /// Queue store and user data sources backed by PostgreSQL.
    pub fn postgres(pool: PgPool, calendar: LocalCalendar, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            store: Arc::new(PgQueueStore::new(pool.clone())),
            oracle: Arc::new(PgPermissionOracle::new(pool.clone())),
            transport,
            recipients: Arc::new(PgRecipientDirectory::new(pool.clone())),
            weekly_stats: Arc::new(PgWeeklyStats::new(pool.clone(), calendar)),
            activity: Arc::new(PgActivityTracker::new(pool)),
            limiter: None,
            clock: None,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}

/// The notification delivery scheduler: the queueing API plus the tick entry
/// point, sharing one store, limiter and policy.
pub struct NotificationScheduler {
    queue: Arc<NotificationQueue>,
    coordinator: TickCoordinator,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl NotificationScheduler {
    pub fn new(config: SchedulerConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            oracle,
            transport,
            recipients,
            weekly_stats,
            activity,
            limiter,
            clock,
        } = collaborators;

        let windows = WindowScheduler::new(&config);
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let limiter = limiter.unwrap_or_else(|| {
            Arc::new(StoreRateLimiter::new(
                store.clone(),
                config.calendar,
                config.daily_cap,
            )) as Arc<dyn RateLimiter>
        });

        let queue = Arc::new(NotificationQueue::new(
            store.clone(),
            oracle,
            limiter.clone(),
            windows.clone(),
            clock.clone(),
            config.max_attempts,
        ));
        let dispatcher = DispatchEngine::new(
            store.clone(),
            limiter,
            transport,
            recipients,
            config.send_timeout,
            config.retry_backoff,
        );
        let reaper = Reaper::new(store.clone(), config.stuck_after);
        let coordinator = TickCoordinator::new(
            store,
            windows,
            dispatcher,
            reaper,
            queue.clone(),
            weekly_stats,
            activity,
            config.inactivity_thresholds.clone(),
        );

        Self {
            queue,
            coordinator,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn queue_notification(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        payload: Value,
    ) -> Result<QueueResult, AppError> {
        self.queue
            .queue_notification(user_id, notification_type, payload)
            .await
    }

    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        self.coordinator.tick(now).await
    }

    /// Tick at an overridden instant without reclaiming stuck entries.
    pub async fn tick_at(&self, at: DateTime<Utc>) -> TickReport {
        self.coordinator.tick_at(at).await
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, AppError> {
        self.queue.queue_stats().await
    }
}
