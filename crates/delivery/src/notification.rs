//! Notification lookup — read-only view of the authoring subsystem.
//!
//! The authoring/storage side owns the `notifications` table; herald only
//! asks two questions about it: "was this canceled?" and "what do I render?".

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::DeliveryError;
use herald_common::types::{Notification, NotificationStatus};

pub struct NotificationLookup;

impl NotificationLookup {
    /// Fetch a notification row. A job referencing an unknown id is
    /// malformed: no number of retries will make the row appear.
    pub async fn fetch(pool: &PgPool, id: Uuid) -> Result<Notification, DeliveryError> {
        let row: Option<Notification> = sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        row.ok_or_else(|| DeliveryError::MalformedJob(format!("notification {} does not exist", id)))
    }

    /// True if the notification was canceled after this job was enqueued.
    /// A missing row reads as not-canceled; the renderer's fetch decides
    /// what to do about it.
    pub async fn is_canceled(pool: &PgPool, id: Uuid) -> Result<bool, DeliveryError> {
        let status: Option<NotificationStatus> =
            sqlx::query_scalar("SELECT status FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;

        Ok(matches!(status, Some(NotificationStatus::Canceled)))
    }
}
