//! Reconciler — persists delivery outcomes and drives throttle bookkeeping.
//!
//! Every outcome lands in the status store exactly the same way (one
//! upsert, history append). A throttled outcome additionally engages the
//! global throttle flag and re-enqueues the job after the retry delay; the
//! worker loop sees `Ok` and moves on.
//!
//! No transaction spans the status write and the re-enqueue. A crash
//! between the two leaves either a duplicate re-enqueue (caught by the
//! gate's already-resolved check) or a missed status update (repaired by
//! the next application) — both paths rely on this type being idempotent.

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use herald_common::error::DeliveryError;
use herald_common::types::{DeliveryOutcome, SendJob};

use crate::queue::SendQueue;
use crate::status_store::StatusStore;
use crate::throttle::ThrottleCoordinator;

pub struct Reconciler {
    throttle: ThrottleCoordinator,
    queue: SendQueue,
    retry_delay_seconds: u64,
}

impl Reconciler {
    pub fn new(retry_delay_seconds: u64) -> Self {
        Self {
            throttle: ThrottleCoordinator::new(),
            queue: SendQueue::new(),
            retry_delay_seconds,
        }
    }

    /// Persist `outcome` for the job's recipient and, when the transport
    /// throttled us, engage the flag and re-enqueue the job.
    ///
    /// Safe to apply twice: the history gains a duplicate entry but every
    /// scalar converges to the same value.
    pub async fn apply(
        &self,
        pool: &PgPool,
        redis: &mut ConnectionManager,
        job: &SendJob,
        outcome: &DeliveryOutcome,
    ) -> Result<(), DeliveryError> {
        StatusStore::record_outcome(pool, job, outcome).await?;

        if outcome.is_throttled() {
            self.throttle
                .set_throttled(redis, self.retry_delay_seconds)
                .await?;
            self.queue
                .enqueue_delayed(redis, job.clone(), self.retry_delay_seconds)
                .await?;

            tracing::warn!(
                notification_id = %job.notification_id,
                recipient_id = %job.recipient_id,
                delay_seconds = self.retry_delay_seconds,
                "Send throttled, job re-enqueued"
            );
        }

        Ok(())
    }

    /// Persist a status that did not come out of a dispatch: gate terminal
    /// failures and the worker's crash path.
    pub async fn record(
        &self,
        pool: &PgPool,
        job: &SendJob,
        code: i32,
        message: Option<&str>,
    ) -> Result<(), DeliveryError> {
        StatusStore::record_code(pool, job, code, message).await
    }
}
