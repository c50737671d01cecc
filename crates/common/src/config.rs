use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Number of concurrent consumer tasks draining the send queue (default: 8)
    pub worker_concurrency: usize,

    /// Sleep between dequeue attempts when the queue is empty, in
    /// milliseconds (default: 250)
    pub queue_poll_interval_ms: u64,

    /// Delay before a throttled job is retried, in seconds. Also the TTL of
    /// the global throttle flag (default: 660)
    pub send_retry_delay_seconds: u64,

    /// Transport attempts inside a single dispatch invocation (default: 2)
    pub max_send_attempts: u32,

    /// Deliveries before a crashing job is recorded as terminally faulted
    /// instead of being redelivered (default: 10)
    pub max_delivery_count: i32,

    /// Delay before the queue re-presents a crashed envelope, in seconds
    /// (default: 30)
    pub redelivery_delay_seconds: u64,

    /// Per-request timeout for the messaging API, in seconds (default: 20)
    pub send_timeout_seconds: u64,

    /// Port the health endpoint listens on (default: 8080)
    pub health_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            worker_concurrency: std::env::var("WORKER_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_CONCURRENCY must be a valid usize"))?,
            queue_poll_interval_ms: std::env::var("QUEUE_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "250".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("QUEUE_POLL_INTERVAL_MS must be a valid u64"))?,
            send_retry_delay_seconds: std::env::var("SEND_RETRY_DELAY_SECONDS")
                .unwrap_or_else(|_| "660".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEND_RETRY_DELAY_SECONDS must be a valid u64"))?,
            max_send_attempts: std::env::var("MAX_SEND_ATTEMPTS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_SEND_ATTEMPTS must be a valid u32"))?,
            max_delivery_count: std::env::var("MAX_DELIVERY_COUNT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_DELIVERY_COUNT must be a valid i32"))?,
            redelivery_delay_seconds: std::env::var("REDELIVERY_DELAY_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REDELIVERY_DELAY_SECONDS must be a valid u64"))?,
            send_timeout_seconds: std::env::var("SEND_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEND_TIMEOUT_SECONDS must be a valid u64"))?,
            health_port: std::env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HEALTH_PORT must be a valid u16"))?,
        })
    }
}
