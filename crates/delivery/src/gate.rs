//! Delivery gate — decides whether a dequeued job may proceed to dispatch.
//!
//! Checks run in a fixed order and short-circuit on the first match:
//! 1. notification canceled → skip, no status write
//! 2. guest recipient → terminal "not supported"
//! 3. recipient already resolved → skip
//! 4. no conversation to post into → terminal "app not installed"
//! 5. global throttle active → reschedule after the retry delay
//!
//! Only a clean pass through all five yields `Proceed`.

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use herald_common::error::DeliveryError;
use herald_common::types::{RecipientType, SendJob, status_code};

use crate::notification::NotificationLookup;
use crate::status_store::StatusStore;
use crate::throttle::ThrottleCoordinator;

/// Why a job was dropped without any status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Canceled,
    AlreadyResolved,
}

/// Decision for one dequeued job.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// All checks passed; dispatch the message.
    Proceed,
    /// Drop the job silently.
    Skip(SkipReason),
    /// Re-enqueue the job unchanged after `delay_seconds`. No status write:
    /// the throttle is system state, not recipient state.
    Reschedule { delay_seconds: u64 },
    /// Record `status_code` as this recipient's terminal status and stop.
    TerminalFailure { status_code: i32, message: String },
}

pub struct DeliveryGate {
    throttle: ThrottleCoordinator,
    /// Delay applied when the global throttle defers a job.
    retry_delay_seconds: u64,
}

impl DeliveryGate {
    pub fn new(retry_delay_seconds: u64) -> Self {
        Self {
            throttle: ThrottleCoordinator::new(),
            retry_delay_seconds,
        }
    }

    /// Evaluate a job against the gate checks, in order.
    pub async fn evaluate(
        &self,
        job: &SendJob,
        pool: &PgPool,
        redis: &mut ConnectionManager,
    ) -> Result<GateDecision, DeliveryError> {
        if NotificationLookup::is_canceled(pool, job.notification_id).await? {
            return Ok(GateDecision::Skip(SkipReason::Canceled));
        }

        if job.recipient_type == RecipientType::Guest {
            return Ok(GateDecision::TerminalFailure {
                status_code: status_code::NOT_SUPPORTED,
                message: "Guest users are not supported as notification recipients".to_string(),
            });
        }

        if StatusStore::already_resolved(pool, job.notification_id, &job.recipient_id).await? {
            return Ok(GateDecision::Skip(SkipReason::AlreadyResolved));
        }

        if missing_target(job) {
            return Ok(GateDecision::TerminalFailure {
                status_code: status_code::FINAL_FAULTED,
                message: "The application is not installed for the recipient".to_string(),
            });
        }

        if self.throttle.is_throttled(redis).await? {
            return Ok(GateDecision::Reschedule {
                delay_seconds: self.retry_delay_seconds,
            });
        }

        Ok(GateDecision::Proceed)
    }
}

/// A job with no conversation to post into can never be delivered.
fn missing_target(job: &SendJob) -> bool {
    job.conversation_id.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn make_job(conversation_id: &str) -> SendJob {
        SendJob {
            notification_id: Uuid::new_v4(),
            recipient_id: "29:user".to_string(),
            recipient_type: RecipientType::User,
            conversation_id: conversation_id.to_string(),
            service_url: "https://smba.example.com/amer".to_string(),
        }
    }

    #[test]
    fn test_missing_target_on_blank_conversation() {
        assert!(missing_target(&make_job("")));
        assert!(missing_target(&make_job("   ")));
    }

    #[test]
    fn test_present_conversation_is_a_target() {
        assert!(!missing_target(&make_job("a:conversation")));
    }
}
