//! Per-user daily send cap.
//!
//! A "day" is the local calendar day of the instant passed in. The limiter is
//! consulted twice: advisory when queueing, and through a reservation right
//! before a send. A reservation counts sends still in flight, so dispatchers
//! running side by side cannot push one user past the cap.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use pastime_common::error::AppError;
use pastime_common::types::QueueStatus;

use crate::clock::LocalCalendar;
use crate::store::QueueStore;

/// Redis counters outlive their day so late reads near midnight still see them.
pub const COUNTER_TTL_SECONDS: i64 = 48 * 60 * 60;

const SENT_COUNTER: &str = "sent";
const RESERVED_COUNTER: &str = "reserved";

/// Outcome of asking for send capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Capacity is held for this send until it is recorded or released.
    Granted,
    /// Completed sends already reach the cap.
    Exhausted,
    /// Only sends still in flight fill the cap; one of them may yet fail.
    Contended,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    fn daily_cap(&self) -> u32;

    async fn count_sent_today(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u32, AppError>;

    async fn would_exceed(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(self.count_sent_today(user_id, now).await? >= self.daily_cap())
    }

    /// Hold one unit of today's capacity for the claimed `entry_id`.
    async fn reserve(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reservation, AppError>;

    /// Give back a granted reservation whose send did not go out.
    async fn release(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Result<(), AppError> {
        Ok(())
    }

    /// Called after an entry reaches `Sent`.
    async fn record_sent(&self, _user_id: Uuid, _now: DateTime<Utc>) -> Result<(), AppError> {
        Ok(())
    }
}

/// Derives the count from entries in the queue store.
///
/// A claimed entry is already `Processing` when it asks for a reservation,
/// so counting the other `Sent` and `Processing` entries of the day is enough:
/// of several concurrent claimers the last one to claim sees all the others.
pub struct StoreRateLimiter {
    store: Arc<dyn QueueStore>,
    calendar: LocalCalendar,
    daily_cap: u32,
}

impl StoreRateLimiter {
    pub fn new(store: Arc<dyn QueueStore>, calendar: LocalCalendar, daily_cap: u32) -> Self {
        Self {
            store,
            calendar,
            daily_cap,
        }
    }
}

#[async_trait]
impl RateLimiter for StoreRateLimiter {
    fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    async fn count_sent_today(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u32, AppError> {
        self.store
            .count_status(user_id, QueueStatus::Sent, self.calendar.day_of(now))
            .await
    }

    async fn reserve(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        let day = self.calendar.day_of(now);
        let committed = self.store.count_committed(user_id, day, entry_id).await?;
        if committed < self.daily_cap {
            return Ok(Reservation::Granted);
        }

        let sent = self.store.count_status(user_id, QueueStatus::Sent, day).await?;
        Ok(if sent >= self.daily_cap {
            Reservation::Exhausted
        } else {
            Reservation::Contended
        })
    }
}

/// Keeps two counters per user and local day in Redis: `reserved` (sends
/// granted, including those in flight) and `sent` (sends completed).
pub struct RedisRateLimiter {
    redis: ConnectionManager,
    calendar: LocalCalendar,
    daily_cap: u32,
}

impl RedisRateLimiter {
    pub fn new(redis: ConnectionManager, calendar: LocalCalendar, daily_cap: u32) -> Self {
        Self {
            redis,
            calendar,
            daily_cap,
        }
    }

    fn key(&self, counter: &str, user_id: Uuid, now: DateTime<Utc>) -> String {
        counter_key(counter, user_id, self.calendar.date_of(now))
    }

    async fn increment(&self, key: &str) -> Result<u32, AppError> {
        let mut redis = self.redis.clone();
        let count: u32 = redis.incr(key, 1).await?;
        redis.expire::<_, ()>(key, COUNTER_TTL_SECONDS).await?;
        Ok(count)
    }

    async fn decrement(&self, key: &str) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        redis.decr::<_, _, i64>(key, 1).await?;
        Ok(())
    }
}

/// `ratelimit:{counter}:{user_id}:{yyyy-mm-dd}`
pub fn counter_key(counter: &str, user_id: Uuid, local_date: NaiveDate) -> String {
    format!(
        "ratelimit:{}:{}:{}",
        counter,
        user_id,
        local_date.format("%Y-%m-%d")
    )
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    fn daily_cap(&self) -> u32 {
        self.daily_cap
    }

    async fn count_sent_today(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u32, AppError> {
        let mut redis = self.redis.clone();
        let count: Option<u32> = redis.get(self.key(SENT_COUNTER, user_id, now)).await?;
        Ok(count.unwrap_or(0))
    }

    /// `INCR` first and check the result, so the check and the hold are one
    /// atomic step; over the cap the increment is undone.
    async fn reserve(
        &self,
        user_id: Uuid,
        _entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reservation, AppError> {
        let key = self.key(RESERVED_COUNTER, user_id, now);
        let reserved = self.increment(&key).await?;
        if reserved <= self.daily_cap {
            tracing::debug!(user_id = %user_id, reserved, cap = self.daily_cap, "Send capacity reserved");
            return Ok(Reservation::Granted);
        }

        self.decrement(&key).await?;
        let sent = self.count_sent_today(user_id, now).await?;
        Ok(if sent >= self.daily_cap {
            Reservation::Exhausted
        } else {
            Reservation::Contended
        })
    }

    async fn release(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        self.decrement(&self.key(RESERVED_COUNTER, user_id, now)).await?;
        tracing::debug!(user_id = %user_id, "Send capacity released");
        Ok(())
    }

    async fn record_sent(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        let count = self.increment(&self.key(SENT_COUNTER, user_id, now)).await?;
        tracing::debug!(user_id = %user_id, count, cap = self.daily_cap, "Sent counter incremented");
        Ok(())
    }
}
