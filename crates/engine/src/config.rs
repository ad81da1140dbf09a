//! Read-only scheduling policy shared by every engine component.

use chrono::{Duration, NaiveTime};

use pastime_common::config::AppConfig;
use pastime_common::error::AppError;

use crate::clock::LocalCalendar;

/// Allowed range for the immediate-class debounce delay, in seconds.
const IMMEDIATE_DELAY_RANGE: std::ops::RangeInclusive<u64> = 120..=300;

/// Inactivity thresholds (days since last activity) that trigger re-engagement.
pub const DEFAULT_INACTIVITY_THRESHOLDS: [u32; 2] = [14, 30];

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub calendar: LocalCalendar,
    pub daily_cap: u32,
    pub max_attempts: i32,
    pub immediate_delay: Duration,
    pub send_timeout: std::time::Duration,
    pub retry_backoff: Duration,
    pub digest_time: NaiveTime,
    pub weekly_generate_time: NaiveTime,
    pub weekly_send_time: NaiveTime,
    pub inactivity_scan_time: NaiveTime,
    pub phase_tolerance: Duration,
    pub stuck_after: Duration,
    pub inactivity_thresholds: Vec<u32>,
}

impl SchedulerConfig {
    /// Build and validate the scheduling policy from environment configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, AppError> {
        let calendar = LocalCalendar::from_offset_minutes(config.utc_offset_minutes).ok_or_else(
            || {
                AppError::Config(format!(
                    "NOTIFY_UTC_OFFSET_MINUTES out of range: {}",
                    config.utc_offset_minutes
                ))
            },
        )?;

        if !IMMEDIATE_DELAY_RANGE.contains(&config.immediate_delay_secs) {
            return Err(AppError::Config(format!(
                "NOTIFY_IMMEDIATE_DELAY_SECS must be within {}..={}, got {}",
                IMMEDIATE_DELAY_RANGE.start(),
                IMMEDIATE_DELAY_RANGE.end(),
                config.immediate_delay_secs
            )));
        }
        if config.daily_cap == 0 {
            return Err(AppError::Config("NOTIFY_DAILY_CAP must be at least 1".into()));
        }
        if config.max_attempts < 1 {
            return Err(AppError::Config("NOTIFY_MAX_ATTEMPTS must be at least 1".into()));
        }
        if !(1..60).contains(&config.phase_tolerance_minutes) {
            return Err(AppError::Config(
                "NOTIFY_PHASE_TOLERANCE_MINUTES must be within 1..=59".into(),
            ));
        }
        if config.weekly_generate_hour >= config.weekly_send_hour {
            return Err(AppError::Config(format!(
                "weekly generation ({}:00) must run before the weekly send ({}:00)",
                config.weekly_generate_hour, config.weekly_send_hour
            )));
        }

        Ok(Self {
            calendar,
            daily_cap: config.daily_cap,
            max_attempts: config.max_attempts,
            immediate_delay: Duration::seconds(config.immediate_delay_secs as i64),
            send_timeout: std::time::Duration::from_secs(config.send_timeout_secs.max(1)),
            retry_backoff: Duration::seconds(config.retry_backoff_secs as i64),
            digest_time: hour("NOTIFY_DIGEST_HOUR", config.digest_hour)?,
            weekly_generate_time: hour(
                "NOTIFY_WEEKLY_GENERATE_HOUR",
                config.weekly_generate_hour,
            )?,
            weekly_send_time: hour("NOTIFY_WEEKLY_SEND_HOUR", config.weekly_send_hour)?,
            inactivity_scan_time: hour(
                "NOTIFY_INACTIVITY_SCAN_HOUR",
                config.inactivity_scan_hour,
            )?,
            phase_tolerance: Duration::minutes(i64::from(config.phase_tolerance_minutes)),
            stuck_after: Duration::minutes(config.stuck_after_minutes.max(1) as i64),
            inactivity_thresholds: DEFAULT_INACTIVITY_THRESHOLDS.to_vec(),
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            calendar: LocalCalendar::utc(),
            daily_cap: 2,
            max_attempts: 3,
            immediate_delay: Duration::minutes(3),
            send_timeout: std::time::Duration::from_secs(30),
            retry_backoff: Duration::hours(1),
            digest_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            weekly_generate_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            weekly_send_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            inactivity_scan_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN),
            phase_tolerance: Duration::minutes(5),
            stuck_after: Duration::minutes(30),
            inactivity_thresholds: DEFAULT_INACTIVITY_THRESHOLDS.to_vec(),
        }
    }
}

fn hour(key: &str, value: u32) -> Result<NaiveTime, AppError> {
    NaiveTime::from_hms_opt(value, 0, 0)
        .ok_or_else(|| AppError::Config(format!("{key} must be within 0..=23, got {value}")))
}
