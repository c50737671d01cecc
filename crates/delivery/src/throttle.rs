//! Throttle coordinator — Redis-backed global send circuit breaker.
//!
//! When the messaging transport rate-limits a send, every worker must stop
//! sending until the cooldown elapses, otherwise concurrent consumers pile
//! retries onto an already saturated API. The flag lives in Redis so all
//! worker processes observe the same state.
//!
//! Uses Redis `SET EX` for an atomic set-with-TTL; expiry is the clearing
//! mechanism, no explicit reset is required.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::error::DeliveryError;

/// Key holding the global throttle flag.
const THROTTLE_KEY: &str = "herald:delivery:throttled";

/// Redis-backed throttle coordinator shared by all workers.
///
/// There is no per-recipient granularity: one flag gates the whole system.
pub struct ThrottleCoordinator;

impl ThrottleCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// True while the system-wide throttle flag is set.
    pub async fn is_throttled(
        &self,
        redis: &mut ConnectionManager,
    ) -> Result<bool, DeliveryError> {
        let throttled: bool = redis.exists(THROTTLE_KEY).await?;
        Ok(throttled)
    }

    /// Engage the throttle: the flag reads true until `delay_seconds` from
    /// now. Repeated calls extend the window.
    pub async fn set_throttled(
        &self,
        redis: &mut ConnectionManager,
        delay_seconds: u64,
    ) -> Result<(), DeliveryError> {
        // SET key "1" EX delay — plain SET (no NX) so every throttle
        // observation pushes the expiry forward
        let _: Option<String> = redis::cmd("SET")
            .arg(THROTTLE_KEY)
            .arg("1")
            .arg("EX")
            .arg(delay_seconds)
            .query_async(redis)
            .await?;

        tracing::warn!(delay_seconds, "Global send throttle engaged");
        Ok(())
    }

    /// Drop the flag immediately (tests and operational overrides).
    pub async fn clear(&self, redis: &mut ConnectionManager) -> Result<(), DeliveryError> {
        redis.del::<_, ()>(THROTTLE_KEY).await?;
        Ok(())
    }
}

impl Default for ThrottleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
