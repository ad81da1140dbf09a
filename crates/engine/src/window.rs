//! Window scheduler: when a queued notification becomes due, and which
//! processing phases a tick at a given instant should run.
//!
//! Both questions are pure functions of the instant passed in, so they can be
//! exercised with fixed timestamps instead of the system clock.
//!
//! Phase windows are bands of `tolerance` minutes starting at a canonical local
//! hour. A ticker running every five minutes therefore lands in each band once;
//! repeated hits inside one band are harmless for dispatch phases (claimed
//! entries leave `Queued`) and are de-duplicated for one-shot phases through
//! [`WindowScheduler::window_key`].

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use pastime_common::types::{NotificationType, ScheduleClass, TimeRange};

use crate::clock::LocalCalendar;
use crate::config::SchedulerConfig;

/// A unit of work the tick coordinator can run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Immediate,
    DailyDigest,
    WeeklyGenerate,
    WeeklySend,
    InactivityScan,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Immediate => "immediate",
            Phase::DailyDigest => "daily_digest",
            Phase::WeeklyGenerate => "weekly_generate",
            Phase::WeeklySend => "weekly_send",
            Phase::InactivityScan => "inactivity_scan",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WindowScheduler {
    calendar: LocalCalendar,
    immediate_delay: Duration,
    digest_time: NaiveTime,
    weekly_generate_time: NaiveTime,
    weekly_send_time: NaiveTime,
    inactivity_scan_time: NaiveTime,
    tolerance: Duration,
}

impl WindowScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            calendar: config.calendar,
            immediate_delay: config.immediate_delay,
            digest_time: config.digest_time,
            weekly_generate_time: config.weekly_generate_time,
            weekly_send_time: config.weekly_send_time,
            inactivity_scan_time: config.inactivity_scan_time,
            tolerance: config.phase_tolerance,
        }
    }

    pub fn calendar(&self) -> LocalCalendar {
        self.calendar
    }

    /// The instant at which an entry of `notification_type` queued at `now`
    /// becomes due. Always `>= now`; strictly later for every class.
    pub fn compute_scheduled_time(
        &self,
        notification_type: NotificationType,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        match notification_type.schedule_class() {
            ScheduleClass::Immediate => now + self.immediate_delay,
            ScheduleClass::Daily => self.next_digest(now),
            ScheduleClass::Weekly => self.next_weekly_send(now),
        }
    }

    /// Today's digest time if `now` is strictly before it, otherwise
    /// tomorrow's. A request arriving exactly at the digest time rolls over.
    fn next_digest(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.calendar.at(self.calendar.date_of(now), self.digest_time);
        if now < today {
            today
        } else {
            today + Duration::days(1)
        }
    }

    /// The first Sunday send time strictly after `now`.
    fn next_weekly_send(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.calendar.date_of(now);
        let days_to_sunday = (7 - date.weekday().num_days_from_sunday()) % 7;
        let candidate = self.calendar.at(date, self.weekly_send_time)
            + Duration::days(i64::from(days_to_sunday));
        if candidate > now {
            candidate
        } else {
            candidate + Duration::weeks(1)
        }
    }

    /// Phases that are in window for a tick at `now`. `Immediate` is always
    /// present.
    pub fn compute_active_phases(&self, now: DateTime<Utc>) -> BTreeSet<Phase> {
        let local = self.calendar.local(now);
        let sunday = local.weekday() == Weekday::Sun;

        let mut phases = BTreeSet::from([Phase::Immediate]);
        if self.in_band(local, self.digest_time) {
            phases.insert(Phase::DailyDigest);
        }
        if sunday && self.in_band(local, self.weekly_generate_time) {
            phases.insert(Phase::WeeklyGenerate);
        }
        if sunday && self.in_band(local, self.weekly_send_time) {
            phases.insert(Phase::WeeklySend);
        }
        if self.in_band(local, self.inactivity_scan_time) {
            phases.insert(Phase::InactivityScan);
        }
        phases
    }

    fn in_band(&self, local: NaiveDateTime, start: NaiveTime) -> bool {
        let offset = local.time().signed_duration_since(start);
        offset >= Duration::zero() && offset < self.tolerance
    }

    /// Identifies the window a one-shot phase run belongs to: the local date
    /// of the tick. Two ticks in the same band share a key.
    pub fn window_key(&self, phase: Phase, now: DateTime<Utc>) -> String {
        format!("{}:{}", phase, self.calendar.date_of(now).format("%Y-%m-%d"))
    }

    /// The seven local days preceding the local day of `now`.
    pub fn previous_week(&self, now: DateTime<Utc>) -> TimeRange {
        let today = self.calendar.day_of(now);
        TimeRange::new(today.start - Duration::weeks(1), today.start)
    }
}
