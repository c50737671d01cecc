use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of recipient a send job targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientType {
    User,
    Guest,
    Team,
    Channel,
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientType::User => write!(f, "user"),
            RecipientType::Guest => write!(f, "guest"),
            RecipientType::Team => write!(f, "team"),
            RecipientType::Channel => write!(f, "channel"),
        }
    }
}

/// Lifecycle status of an authored notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Sending,
    Sent,
    Canceled,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Queued => write!(f, "queued"),
            NotificationStatus::Sending => write!(f, "sending"),
            NotificationStatus::Sent => write!(f, "sent"),
            NotificationStatus::Canceled => write!(f, "canceled"),
            NotificationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Delivery status codes recorded per recipient.
///
/// HTTP codes from the messaging transport pass through verbatim (201, 429,
/// 4xx/5xx). Sentinel codes are negative so they can never collide with a
/// transport status.
pub mod status_code {
    /// Row exists but no attempt has completed yet.
    pub const INITIALIZATION: i32 = 0;
    /// Message accepted by the transport.
    pub const CREATED: i32 = 201;
    /// Transport rate-limited the send.
    pub const TOO_MANY_REQUESTS: i32 = 429;
    /// Worker crashed below the redelivery cap; the queue will retry.
    pub const FAULTED_AND_RETRYING: i32 = -1;
    /// Terminal fault: missing target or redelivery cap reached.
    pub const FINAL_FAULTED: i32 = -2;
    /// Recipient kind the transport cannot reach (guest user). Terminal.
    pub const NOT_SUPPORTED: i32 = -3;

    /// True if `code` ends the delivery: it will never be retried.
    pub fn is_terminal(code: i32) -> bool {
        matches!(code, CREATED | FINAL_FAULTED | NOT_SUPPORTED)
    }
}

/// One recipient-scoped send request dequeued for processing.
///
/// Immutable; re-enqueued copies are new envelopes carrying the same
/// logical identity (notification id + recipient id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendJob {
    pub notification_id: Uuid,
    pub recipient_id: String,
    pub recipient_type: RecipientType,
    /// Conversation the message is posted into. Blank when the app was
    /// never installed for this recipient.
    pub conversation_id: String,
    /// Base URL of the messaging API serving this conversation.
    pub service_url: String,
}

/// A job plus the queue metadata presented with each delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope {
    pub message_id: Uuid,
    /// How many times the queue has presented this envelope, starting at 1.
    pub delivery_count: i32,
    pub enqueued_at: DateTime<Utc>,
    pub job: SendJob,
}

/// A notification as authored upstream. herald only reads these rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub author: String,
    pub action_url: Option<String>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Durable per-recipient delivery status, keyed by
/// (notification_id, recipient_id).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryStatusRecord {
    pub notification_id: Uuid,
    pub recipient_id: String,
    /// Transport-assigned message id; empty until a send succeeds.
    pub activity_id: String,
    pub status_code: i32,
    /// Every status code ever observed for this recipient, in order.
    /// Append-only.
    pub status_history: Vec<i32>,
    pub throttle_count: i32,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Classified result of one dispatch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Succeeded {
        status_code: i32,
        activity_id: String,
    },
    Throttled {
        status_code: i32,
        /// Throttle responses observed within this invocation.
        throttle_count: i32,
    },
    Failed {
        status_code: i32,
        error_message: String,
    },
}

impl DeliveryOutcome {
    pub fn status_code(&self) -> i32 {
        match self {
            DeliveryOutcome::Succeeded { status_code, .. }
            | DeliveryOutcome::Throttled { status_code, .. }
            | DeliveryOutcome::Failed { status_code, .. } => *status_code,
        }
    }

    pub fn activity_id(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Succeeded { activity_id, .. } => Some(activity_id),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Failed { error_message, .. } => Some(error_message),
            _ => None,
        }
    }

    pub fn throttle_count(&self) -> i32 {
        match self {
            DeliveryOutcome::Throttled { throttle_count, .. } => *throttle_count,
            _ => 0,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, DeliveryOutcome::Throttled { .. })
    }
}

/// Rendered activity ready to post to the messaging API. Opaque to the
/// delivery core; the renderer owns its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub activity: serde_json::Value,
}
