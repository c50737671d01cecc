//! Send queue — Redis-backed delivery queue with redelivery bookkeeping.
//!
//! Layout:
//! - `herald:queue:send:ready` — list of envelopes ready for consumption
//! - `herald:queue:send:delayed` — zset of envelopes scored by ready-at time
//!
//! Envelopes carry the queue metadata the worker loop's failure policy
//! needs: `delivery_count` is bumped on every dequeue and preserved across
//! crash-path redelivery, so the dead-letter cap keeps advancing. Re-enqueue
//! after a throttle creates a fresh envelope (same logical job identity,
//! new message id, reset count).

use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use herald_common::error::DeliveryError;
use herald_common::types::{QueueEnvelope, SendJob};

const READY_KEY: &str = "herald:queue:send:ready";
const DELAYED_KEY: &str = "herald:queue:send:delayed";

/// Redis-backed send queue.
pub struct SendQueue;

impl SendQueue {
    pub fn new() -> Self {
        Self
    }

    /// Enqueue a fresh job for immediate delivery.
    pub async fn enqueue(
        &self,
        redis: &mut ConnectionManager,
        job: SendJob,
    ) -> Result<(), DeliveryError> {
        let envelope = Self::wrap(job);
        self.push_ready(redis, &envelope).await
    }

    /// Enqueue a copy of `job` that becomes deliverable after
    /// `delay_seconds`. The copy keeps the job's logical identity but gets a
    /// fresh message id and delivery count.
    pub async fn enqueue_delayed(
        &self,
        redis: &mut ConnectionManager,
        job: SendJob,
        delay_seconds: u64,
    ) -> Result<(), DeliveryError> {
        let envelope = Self::wrap(job);
        self.push_delayed(redis, &envelope, delay_seconds).await
    }

    /// Re-present a crashed envelope after `delay_seconds`, preserving its
    /// delivery count.
    pub async fn redeliver(
        &self,
        redis: &mut ConnectionManager,
        envelope: &QueueEnvelope,
        delay_seconds: u64,
    ) -> Result<(), DeliveryError> {
        self.push_delayed(redis, envelope, delay_seconds).await
    }

    /// Pop the next ready envelope, bumping its delivery count.
    ///
    /// Envelopes that fail to decode are dropped with an error log — a
    /// structurally invalid message can never be delivered, so redelivering
    /// it would only loop.
    pub async fn try_dequeue(
        &self,
        redis: &mut ConnectionManager,
    ) -> Result<Option<QueueEnvelope>, DeliveryError> {
        let raw: Option<String> = redis.lpop(READY_KEY, None).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match decode(&raw) {
            Ok(mut envelope) => {
                envelope.delivery_count += 1;
                Ok(Some(envelope))
            }
            Err(e) => {
                tracing::error!(error = %e, "Dropping undecodable queue message");
                Ok(None)
            }
        }
    }

    /// Move every due envelope from the delayed zset to the ready list.
    ///
    /// ZREM is the claim: concurrent promoters race on the same member and
    /// only the winner pushes, so an envelope is promoted at most once.
    pub async fn promote_due(&self, redis: &mut ConnectionManager) -> Result<u32, DeliveryError> {
        let now = Utc::now().timestamp();
        let due: Vec<String> = redis.zrangebyscore(DELAYED_KEY, "-inf", now).await?;

        let mut promoted = 0u32;
        for raw in due {
            let removed: i64 = redis.zrem(DELAYED_KEY, &raw).await?;
            if removed > 0 {
                let _: i64 = redis.rpush(READY_KEY, &raw).await?;
                promoted += 1;
            }
        }

        if promoted > 0 {
            tracing::debug!(promoted, "Promoted delayed jobs to ready");
        }
        Ok(promoted)
    }

    fn wrap(job: SendJob) -> QueueEnvelope {
        QueueEnvelope {
            message_id: Uuid::new_v4(),
            delivery_count: 0,
            enqueued_at: Utc::now(),
            job,
        }
    }

    async fn push_ready(
        &self,
        redis: &mut ConnectionManager,
        envelope: &QueueEnvelope,
    ) -> Result<(), DeliveryError> {
        let raw = encode(envelope)?;
        let _: i64 = redis.rpush(READY_KEY, raw).await?;
        Ok(())
    }

    async fn push_delayed(
        &self,
        redis: &mut ConnectionManager,
        envelope: &QueueEnvelope,
        delay_seconds: u64,
    ) -> Result<(), DeliveryError> {
        let ready_at = Utc::now().timestamp() + delay_seconds as i64;
        let raw = encode(envelope)?;
        let _: i64 = redis.zadd(DELAYED_KEY, raw, ready_at).await?;
        Ok(())
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(envelope: &QueueEnvelope) -> Result<String, DeliveryError> {
    serde_json::to_string(envelope)
        .map_err(|e| DeliveryError::Internal(format!("encode queue envelope: {}", e)))
}

fn decode(raw: &str) -> Result<QueueEnvelope, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::RecipientType;

    fn make_job() -> SendJob {
        SendJob {
            notification_id: Uuid::new_v4(),
            recipient_id: "29:user".to_string(),
            recipient_type: RecipientType::User,
            conversation_id: "a:conversation".to_string(),
            service_url: "https://smba.example.com/amer".to_string(),
        }
    }

    #[test]
    fn test_wrap_starts_with_zero_deliveries() {
        let envelope = SendQueue::wrap(make_job());
        assert_eq!(envelope.delivery_count, 0);
    }

    #[test]
    fn test_encode_decode_preserves_identity() {
        let envelope = SendQueue::wrap(make_job());
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded.message_id, envelope.message_id);
        assert_eq!(decoded.job.notification_id, envelope.job.notification_id);
        assert_eq!(decoded.job.recipient_id, envelope.job.recipient_id);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("not json at all").is_err());
        assert!(decode(r#"{"message_id": "nope"}"#).is_err());
    }
}
