//! herald delivery worker binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use herald_common::config::AppConfig;
use herald_common::db::create_pool;
use herald_common::redis_pool::create_redis_pool;
use herald_delivery::queue::SendQueue;
use herald_delivery::worker::SendWorker;

mod health;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_worker=info,herald_delivery=info".into()),
        )
        .json()
        .init();

    tracing::info!("Herald delivery worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis
    let redis = create_redis_pool(&config.redis_url).await?;

    // Health endpoint
    let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health_port));
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr).await {
            tracing::error!(error = %e, "Health endpoint failed");
        }
    });

    // Promoter: moves due delayed jobs onto the ready list
    let promote_interval = Duration::from_millis(config.queue_poll_interval_ms);
    let mut promoter_redis = redis.clone();
    tokio::spawn(async move {
        let queue = SendQueue::new();
        loop {
            if let Err(e) = queue.promote_due(&mut promoter_redis).await {
                tracing::error!(error = %e, "Failed to promote delayed jobs");
            }
            tokio::time::sleep(promote_interval).await;
        }
    });

    // Consumers: parallelism is bounded here and nowhere else
    let worker = Arc::new(SendWorker::new(pool.clone(), &config)?);
    let poll_interval = Duration::from_millis(config.queue_poll_interval_ms);
    let redelivery_delay = config.redelivery_delay_seconds;

    let mut handles = Vec::with_capacity(config.worker_concurrency);
    for consumer_id in 0..config.worker_concurrency {
        let worker = Arc::clone(&worker);
        let mut redis = redis.clone();

        handles.push(tokio::spawn(async move {
            let queue = SendQueue::new();
            loop {
                match queue.try_dequeue(&mut redis).await {
                    Ok(Some(envelope)) => {
                        if let Err(err) = worker.process(&mut redis, &envelope).await {
                            tracing::warn!(
                                consumer_id,
                                message_id = %envelope.message_id,
                                delivery_count = envelope.delivery_count,
                                error = %err,
                                "Job failed, scheduling redelivery"
                            );
                            if let Err(requeue_err) = queue
                                .redeliver(&mut redis, &envelope, redelivery_delay)
                                .await
                            {
                                tracing::error!(
                                    consumer_id,
                                    error = %requeue_err,
                                    "Failed to redeliver job"
                                );
                            }
                        }
                    }
                    Ok(None) => tokio::time::sleep(poll_interval).await,
                    Err(err) => {
                        tracing::error!(consumer_id, error = %err, "Dequeue failed");
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        }));
    }

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Consumers started"
    );

    // Run until shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    for handle in &handles {
        handle.abort();
    }

    tracing::info!("Herald delivery worker stopped.");
    Ok(())
}
