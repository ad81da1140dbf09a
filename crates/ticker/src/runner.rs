use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use pastime_engine::NotificationScheduler;
use pastime_engine::coordinator::TickReport;

/// Drives the scheduler's tick on a fixed period.
pub struct TickRunner {
    scheduler: Arc<NotificationScheduler>,
    period: Duration,
}

impl TickRunner {
    pub fn new(scheduler: Arc<NotificationScheduler>, period: Duration) -> Self {
        Self { scheduler, period }
    }

    /// Run a single tick at the scheduler's current time.
    pub async fn tick_once(&self) -> TickReport {
        let report = self.scheduler.tick(self.scheduler.now()).await;
        for error in &report.errors {
            tracing::warn!(error = %error, "Tick phase reported an error");
        }
        report
    }

    /// Tick immediately and then every period until `shutdown` resolves.
    /// A tick in progress is allowed to finish. Returns the number of ticks run.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> u64 {
        let mut interval = tokio::time::interval(self.period);
        // a slow tick must not trigger a burst of catch-up ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_secs = self.period.as_secs(), "Tick loop started");

        tokio::pin!(shutdown);
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    self.tick_once().await;
                    ticks += 1;
                }
            }
        }

        tracing::info!(ticks, "Tick loop stopped");
        ticks
    }
}
