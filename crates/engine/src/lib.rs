pub mod aggregator;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod message;
pub mod queue;
pub mod rate_limit;
pub mod reaper;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod window;

pub use scheduler::{Collaborators, NotificationScheduler};
