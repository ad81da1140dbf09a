use redis::Client;
use redis::aio::ConnectionManager;

/// Connect to Redis when a URL is configured and verify the server answers.
///
/// Returns `None` when no URL is set; callers then fall back to counting
/// sent notifications in the queue table.
pub async fn connect_optional(redis_url: Option<&str>) -> anyhow::Result<Option<ConnectionManager>> {
    let Some(url) = redis_url else {
        tracing::info!("REDIS_URL not set, sent counts derived from the queue store");
        return Ok(None);
    };

    let client = Client::open(url)?;
    let mut manager = ConnectionManager::new(client).await?;
    let _: String = redis::cmd("PING").query_async(&mut manager).await?;

    tracing::info!("Connected to Redis");
    Ok(Some(manager))
}
