//! Worker loop — gate → dispatch → reconcile for one dequeued job, plus
//! the top-level failure policy.
//!
//! All terminal and no-op outcomes are absorbed here. Only crashes below
//! the redelivery cap propagate to the queue, so its redelivery counter is
//! the only thing advancing retries. Malformed jobs are logged and
//! absorbed without ever reaching the reconciler: redelivering a
//! structurally invalid job can never succeed.

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use herald_common::config::AppConfig;
use herald_common::error::DeliveryError;
use herald_common::types::{DeliveryOutcome, QueueEnvelope, SendJob, status_code};

use crate::dispatcher::Dispatcher;
use crate::gate::{DeliveryGate, GateDecision};
use crate::notification::NotificationLookup;
use crate::queue::SendQueue;
use crate::reconciler::Reconciler;
use crate::render::MessageRenderer;

/// What to do with a job that crashed mid-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CrashDisposition {
    /// Below the redelivery cap: record "faulted and retrying" and let the
    /// queue redeliver.
    RecordAndRetry,
    /// Cap reached: record a terminal fault and absorb the error.
    RecordTerminal,
}

fn crash_disposition(delivery_count: i32, max_delivery_count: i32) -> CrashDisposition {
    if delivery_count >= max_delivery_count {
        CrashDisposition::RecordTerminal
    } else {
        CrashDisposition::RecordAndRetry
    }
}

/// Structurally invalid jobs are rejected before any check runs.
fn validate(job: &SendJob) -> Result<(), DeliveryError> {
    if job.notification_id.is_nil() {
        return Err(DeliveryError::MalformedJob(
            "notification id is nil".to_string(),
        ));
    }
    if job.recipient_id.trim().is_empty() {
        return Err(DeliveryError::MalformedJob(
            "recipient id is empty".to_string(),
        ));
    }
    if job.service_url.trim().is_empty() {
        return Err(DeliveryError::MalformedJob(
            "service url is empty".to_string(),
        ));
    }
    Ok(())
}

/// Processes one envelope at a time; many instances run concurrently, one
/// per consumer task, coordinating only through the status store and the
/// throttle flag.
pub struct SendWorker {
    pool: PgPool,
    gate: DeliveryGate,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    renderer: MessageRenderer,
    queue: SendQueue,
    max_delivery_count: i32,
}

impl SendWorker {
    pub fn new(pool: PgPool, config: &AppConfig) -> Result<Self, DeliveryError> {
        Ok(Self {
            pool,
            gate: DeliveryGate::new(config.send_retry_delay_seconds),
            dispatcher: Dispatcher::new(config.max_send_attempts, config.send_timeout_seconds)?,
            reconciler: Reconciler::new(config.send_retry_delay_seconds),
            renderer: MessageRenderer::new(),
            queue: SendQueue::new(),
            max_delivery_count: config.max_delivery_count,
        })
    }

    /// Process one dequeued envelope. An `Err` means the queue must
    /// redeliver; everything else has been absorbed.
    pub async fn process(
        &self,
        redis: &mut ConnectionManager,
        envelope: &QueueEnvelope,
    ) -> Result<(), DeliveryError> {
        match self.try_process(redis, envelope).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_malformed() => {
                tracing::error!(
                    message_id = %envelope.message_id,
                    error = %err,
                    "Dropping malformed job"
                );
                Ok(())
            }
            Err(err) => self.handle_crash(envelope, err).await,
        }
    }

    async fn try_process(
        &self,
        redis: &mut ConnectionManager,
        envelope: &QueueEnvelope,
    ) -> Result<(), DeliveryError> {
        let job = &envelope.job;
        validate(job)?;

        match self.gate.evaluate(job, &self.pool, redis).await? {
            GateDecision::Skip(reason) => {
                tracing::info!(
                    notification_id = %job.notification_id,
                    recipient_id = %job.recipient_id,
                    ?reason,
                    "Job skipped"
                );
                Ok(())
            }
            GateDecision::TerminalFailure {
                status_code,
                message,
            } => {
                self.reconciler
                    .record(&self.pool, job, status_code, Some(message.as_str()))
                    .await?;
                tracing::info!(
                    notification_id = %job.notification_id,
                    recipient_id = %job.recipient_id,
                    status_code,
                    "Job terminally failed at the gate"
                );
                Ok(())
            }
            GateDecision::Reschedule { delay_seconds } => {
                self.queue
                    .enqueue_delayed(redis, job.clone(), delay_seconds)
                    .await?;
                tracing::info!(
                    notification_id = %job.notification_id,
                    recipient_id = %job.recipient_id,
                    delay_seconds,
                    "System throttled, job rescheduled"
                );
                Ok(())
            }
            GateDecision::Proceed => {
                let notification =
                    NotificationLookup::fetch(&self.pool, job.notification_id).await?;
                let payload = self.renderer.render(&notification);
                let outcome = self
                    .dispatcher
                    .send(&payload, &job.service_url, &job.conversation_id)
                    .await;

                self.reconciler.apply(&self.pool, redis, job, &outcome).await?;

                match &outcome {
                    DeliveryOutcome::Succeeded { activity_id, .. } => {
                        tracing::info!(
                            notification_id = %job.notification_id,
                            recipient_id = %job.recipient_id,
                            activity_id = %activity_id,
                            "Message delivered"
                        );
                    }
                    DeliveryOutcome::Throttled { .. } => {}
                    DeliveryOutcome::Failed {
                        status_code,
                        error_message,
                    } => {
                        tracing::warn!(
                            notification_id = %job.notification_id,
                            recipient_id = %job.recipient_id,
                            status_code,
                            error = %error_message,
                            "Message delivery failed"
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_crash(
        &self,
        envelope: &QueueEnvelope,
        err: DeliveryError,
    ) -> Result<(), DeliveryError> {
        let job = &envelope.job;
        match crash_disposition(envelope.delivery_count, self.max_delivery_count) {
            CrashDisposition::RecordTerminal => {
                let message = err.to_string();
                if let Err(write_err) = self
                    .reconciler
                    .record(
                        &self.pool,
                        job,
                        status_code::FINAL_FAULTED,
                        Some(message.as_str()),
                    )
                    .await
                {
                    tracing::error!(error = %write_err, "Failed to record terminal fault");
                }
                tracing::error!(
                    notification_id = %job.notification_id,
                    recipient_id = %job.recipient_id,
                    delivery_count = envelope.delivery_count,
                    error = %err,
                    "Delivery cap reached, job dead-lettered"
                );
                Ok(())
            }
            CrashDisposition::RecordAndRetry => {
                let message = err.to_string();
                self.reconciler
                    .record(
                        &self.pool,
                        job,
                        status_code::FAULTED_AND_RETRYING,
                        Some(message.as_str()),
                    )
                    .await?;
                tracing::warn!(
                    notification_id = %job.notification_id,
                    recipient_id = %job.recipient_id,
                    delivery_count = envelope.delivery_count,
                    error = %err,
                    "Job faulted, leaving to queue redelivery"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_common::types::RecipientType;
    use uuid::Uuid;

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
    fn test_crash_below_cap_retries() {
        assert_eq!(crash_disposition(1, 10), CrashDisposition::RecordAndRetry);
        assert_eq!(crash_disposition(9, 10), CrashDisposition::RecordAndRetry);
    }

    #[test]
    fn test_crash_at_cap_is_terminal() {
        assert_eq!(crash_disposition(10, 10), CrashDisposition::RecordTerminal);
        assert_eq!(crash_disposition(11, 10), CrashDisposition::RecordTerminal);
    }

    #[test]
    fn test_validate_accepts_well_formed_job() {
        assert!(validate(&make_job()).is_ok());
    }

    #[test]
    fn test_validate_rejects_nil_notification() {
        let mut job = make_job();
        job.notification_id = Uuid::nil();
        assert!(matches!(
            validate(&job),
            Err(DeliveryError::MalformedJob(_))
        ));
    }

    #[test]
    fn test_validate_rejects_blank_recipient_and_service_url() {
        let mut job = make_job();
        job.recipient_id = "  ".to_string();
        assert!(matches!(
            validate(&job),
            Err(DeliveryError::MalformedJob(_))
        ));

        let mut job = make_job();
        job.service_url = String::new();
        assert!(matches!(
            validate(&job),
            Err(DeliveryError::MalformedJob(_))
        ));
    }
}
