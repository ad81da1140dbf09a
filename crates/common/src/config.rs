use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string. When set, sent counts are kept in Redis
    /// instead of being derived from the queue table.
    pub redis_url: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Maximum successful sends per user per local calendar day (default: 2)
    pub daily_cap: u32,

    /// Delivery attempts before an entry is marked failed (default: 3)
    pub max_attempts: i32,

    /// Debounce delay for streak / re-engagement notifications (default: 180s)
    pub immediate_delay_secs: u64,

    /// Upper bound for a single mail transport call (default: 30s)
    pub send_timeout_secs: u64,

    /// Linear backoff step between retries (default: 3600s)
    pub retry_backoff_secs: u64,

    /// Offset of the canonical local calendar from UTC, in minutes (default: 0)
    pub utc_offset_minutes: i32,

    /// Local hour of the achievement digest window (default: 20)
    pub digest_hour: u32,

    /// Local Sunday hour at which weekly summaries are generated (default: 9)
    pub weekly_generate_hour: u32,

    /// Local Sunday hour at which weekly summaries are sent (default: 10)
    pub weekly_send_hour: u32,

    /// Local hour of the daily inactivity scan (default: 12)
    pub inactivity_scan_hour: u32,

    /// Width of each phase window in minutes (default: 5)
    pub phase_tolerance_minutes: u32,

    /// Processing entries older than this are reclaimed (default: 30)
    pub stuck_after_minutes: u64,

    /// Period of the ticker loop in seconds (default: 300)
    pub tick_interval_secs: u64,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Port the API server listens on (default: 3000)
    pub api_port: u16,

    /// Shared secret expected in `X-Scheduler-Token` on `/api/*` routes
    pub scheduler_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            daily_cap: parse_var("NOTIFY_DAILY_CAP", "2")?,
            max_attempts: parse_var("NOTIFY_MAX_ATTEMPTS", "3")?,
            immediate_delay_secs: parse_var("NOTIFY_IMMEDIATE_DELAY_SECS", "180")?,
            send_timeout_secs: parse_var("NOTIFY_SEND_TIMEOUT_SECS", "30")?,
            retry_backoff_secs: parse_var("NOTIFY_RETRY_BACKOFF_SECS", "3600")?,
            utc_offset_minutes: parse_var("NOTIFY_UTC_OFFSET_MINUTES", "0")?,
            digest_hour: parse_var("NOTIFY_DIGEST_HOUR", "20")?,
            weekly_generate_hour: parse_var("NOTIFY_WEEKLY_GENERATE_HOUR", "9")?,
            weekly_send_hour: parse_var("NOTIFY_WEEKLY_SEND_HOUR", "10")?,
            inactivity_scan_hour: parse_var("NOTIFY_INACTIVITY_SCAN_HOUR", "12")?,
            phase_tolerance_minutes: parse_var("NOTIFY_PHASE_TOLERANCE_MINUTES", "5")?,
            stuck_after_minutes: parse_var("NOTIFY_STUCK_AFTER_MINUTES", "30")?,
            tick_interval_secs: parse_var("TICK_INTERVAL_SECS", "300")?,
            resend_api_key: std::env::var("RESEND_API_KEY").ok().filter(|s| !s.is_empty()),
            email_from: std::env::var("EMAIL_FROM").ok(),
            api_port: parse_var("API_PORT", "3000")?,
            scheduler_token: std::env::var("SCHEDULER_TOKEN").ok().filter(|s| !s.is_empty()),
        })
    }
}

impl Default for AppConfig {
    /// Defaults matching `from_env` with no variables set, except for the
    /// required database URL which is left empty.
    fn default() -> Self {
        Self {
            database_url: String::new(),
            redis_url: None,
            db_max_connections: 20,
            daily_cap: 2,
            max_attempts: 3,
            immediate_delay_secs: 180,
            send_timeout_secs: 30,
            retry_backoff_secs: 3600,
            utc_offset_minutes: 0,
            digest_hour: 20,
            weekly_generate_hour: 9,
            weekly_send_hour: 10,
            inactivity_scan_hour: 12,
            phase_tolerance_minutes: 5,
            stuck_after_minutes: 30,
            tick_interval_secs: 300,
            resend_api_key: None,
            email_from: None,
            api_port: 3000,
            scheduler_token: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> anyhow::Result<T> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|_| {
        anyhow::anyhow!(
            "{} must be a valid {}",
            key,
            std::any::type_name::<T>()
        )
    })
}
