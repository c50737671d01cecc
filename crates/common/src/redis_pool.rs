use redis::Client;
use redis::aio::ConnectionManager;

/// Create the Redis connection manager shared by the send queue and the
/// throttle flag. The manager multiplexes one connection and reconnects on
/// failure, so tasks clone it freely.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Connected to Redis");
    Ok(manager)
}
