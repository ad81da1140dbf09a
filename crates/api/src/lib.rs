//! HTTP surface of the notification scheduler.
//!
//! Endpoints:
//! - GET  /health
//! - POST /api/notifications: queue a notification for a user
//! - GET  /api/queue/stats: queue counters by status
//! - POST /api/tick: run one scheduler tick (for an external cron)

pub mod middleware;
pub mod routes;
pub mod state;
