//! Status store — durable per-recipient delivery status.
//!
//! One row per (notification_id, recipient_id), created implicitly on first
//! write and mutated by every reconciliation for that pair. The status-code
//! history is appended server-side (`array_append` inside the upsert) so
//! concurrent writers can never lose entries; it is never rewritten or
//! truncated. Scalar fields are last-writer-wins, except `activity_id`,
//! which keeps its previous non-empty value when the incoming outcome has
//! none.

use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::DeliveryError;
use herald_common::types::{DeliveryOutcome, DeliveryStatusRecord, SendJob, status_code};

/// Service layer over the `delivery_status` table.
pub struct StatusStore;

impl StatusStore {
    /// Persist the outcome of one dispatch invocation.
    pub async fn record_outcome(
        pool: &PgPool,
        job: &SendJob,
        outcome: &DeliveryOutcome,
    ) -> Result<(), DeliveryError> {
        Self::upsert(
            pool,
            job.notification_id,
            &job.recipient_id,
            outcome.status_code(),
            outcome.activity_id().unwrap_or(""),
            outcome.throttle_count(),
            outcome.error_message(),
        )
        .await
    }

    /// Persist a status that did not come out of a dispatch: gate terminal
    /// failures and the worker's crash path.
    pub async fn record_code(
        pool: &PgPool,
        job: &SendJob,
        code: i32,
        error_message: Option<&str>,
    ) -> Result<(), DeliveryError> {
        Self::upsert(
            pool,
            job.notification_id,
            &job.recipient_id,
            code,
            "",
            0,
            error_message,
        )
        .await
    }

    /// Fetch the status row for a recipient, if any.
    pub async fn get(
        pool: &PgPool,
        notification_id: Uuid,
        recipient_id: &str,
    ) -> Result<Option<DeliveryStatusRecord>, DeliveryError> {
        let row: Option<DeliveryStatusRecord> = sqlx::query_as(
            "SELECT * FROM delivery_status WHERE notification_id = $1 AND recipient_id = $2",
        )
        .bind(notification_id)
        .bind(recipient_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// True if this recipient's delivery already reached a terminal code
    /// (fully sent or permanently failed).
    pub async fn already_resolved(
        pool: &PgPool,
        notification_id: Uuid,
        recipient_id: &str,
    ) -> Result<bool, DeliveryError> {
        let resolved = Self::get(pool, notification_id, recipient_id)
            .await?
            .map(|row| status_code::is_terminal(row.status_code))
            .unwrap_or(false);

        Ok(resolved)
    }

    async fn upsert(
        pool: &PgPool,
        notification_id: Uuid,
        recipient_id: &str,
        code: i32,
        activity_id: &str,
        throttle_count: i32,
        error_message: Option<&str>,
    ) -> Result<(), DeliveryError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_status
                (notification_id, recipient_id, activity_id, status_code,
                 status_history, throttle_count, error_message, updated_at)
            VALUES ($1, $2, $3, $4, ARRAY[$4], $5, $6, now())
            ON CONFLICT (notification_id, recipient_id) DO UPDATE
            SET activity_id = CASE
                    WHEN EXCLUDED.activity_id = '' THEN delivery_status.activity_id
                    ELSE EXCLUDED.activity_id
                END,
                status_code = EXCLUDED.status_code,
                status_history = array_append(delivery_status.status_history, EXCLUDED.status_code),
                throttle_count = EXCLUDED.throttle_count,
                error_message = EXCLUDED.error_message,
                updated_at = now()
            "#,
        )
        .bind(notification_id)
        .bind(recipient_id)
        .bind(activity_id)
        .bind(code)
        .bind(throttle_count)
        .bind(error_message)
        .execute(pool)
        .await?;

        Ok(())
    }
}
