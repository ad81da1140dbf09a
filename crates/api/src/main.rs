//! Pastime notification API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pastime_common::config::AppConfig;
use pastime_common::{db, redis_pool};
use pastime_engine::config::SchedulerConfig;
use pastime_engine::rate_limit::RedisRateLimiter;
use pastime_engine::{Collaborators, NotificationScheduler};

use pastime_api::routes::create_router;
use pastime_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("pastime_api=debug,pastime_engine=info,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Pastime notification API server...");

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

    if config.scheduler_token.is_none() {
        tracing::warn!("SCHEDULER_TOKEN not set, /api routes are unauthenticated");
    }

    let scheduler = Arc::new(NotificationScheduler::new(policy, collaborators));
    let state = AppState::new(scheduler, config.scheduler_token.clone());

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal, stopping gracefully...");
        })
        .await?;

    Ok(())
}
