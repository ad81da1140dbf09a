use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use pastime_common::config::AppConfig;
use pastime_common::{db, redis_pool};
use pastime_engine::config::SchedulerConfig;
use pastime_engine::rate_limit::RedisRateLimiter;
use pastime_engine::{Collaborators, NotificationScheduler};
use pastime_ticker::runner::TickRunner;

#[derive(Parser)]
#[command(name = "pastime-ticker", version, about = "Periodic driver for the notification scheduler")]
struct Cli {
    /// Run a single tick and exit
    #[arg(long)]
    once: bool,

    /// Override the tick period from TICK_INTERVAL_SECS
    #[arg(long)]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pastime_ticker=info,pastime_engine=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    tracing::info!("Pastime ticker starting...");

    let config = AppConfig::from_env()?;
    let policy = SchedulerConfig::from_app_config(&config)?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    let transport = pastime_notifier::transport_from_config(&config)?;
    let mut collaborators = Collaborators::postgres(pool, policy.calendar, transport);
    if let Some(redis) = redis_pool::connect_optional(config.redis_url.as_deref()).await? {
        collaborators = collaborators.with_limiter(Arc::new(RedisRateLimiter::new(
            redis,
            policy.calendar,
            policy.daily_cap,
        )));
    }

    let scheduler = Arc::new(NotificationScheduler::new(policy, collaborators));
    let period = Duration::from_secs(cli.interval_secs.unwrap_or(config.tick_interval_secs).max(1));
    let runner = TickRunner::new(scheduler, period);

    if cli.once {
        let report = runner.tick_once().await;
        tracing::info!(
            sent = report.dispatch.sent,
            failed = report.dispatch.failed,
            errors = report.errors.len(),
            "Single tick finished"
        );
        return Ok(());
    }

    runner
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await;

    tracing::info!("Pastime ticker stopped.");
    Ok(())
}
