//! Notification status store.
//!
//! The single write path for notification lifecycle state. Every transition
//! runs inside a transaction holding a row-level lock on the notification,
//! so two concurrent callbacks for the same reference serialize here rather
//! than interleaving.

use chrono::Utc;
use metrics::counter;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{Notification, NotificationStatus};

/// Result of applying a status transition.
#[derive(Debug)]
pub enum StatusUpdate {
    /// The transition was written; carries the fresh row.
    Applied(Notification),
    /// The notification is already terminal (or already in this status);
    /// observed and ignored, no write.
    Duplicate,
    /// No notification matches the reference. Common for late callbacks
    /// after local cleanup — the caller decides retry vs. ignore.
    NotFound,
}

pub struct StatusStore;

impl StatusStore {
    /// Apply a provider-reported status to the notification correlated by
    /// `reference`.
    ///
    /// Once a notification reaches a terminal status, later callbacks are
    /// duplicates: a stale `delivered` must not overwrite a `permanent-failure`
    /// that arrived first, and vice versa. Duplicates are logged and counted,
    /// never treated as errors.
    pub async fn apply_status(
        pool: &PgPool,
        reference: &str,
        status: NotificationStatus,
        provider: &str,
    ) -> Result<StatusUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let existing: Option<Notification> =
            sqlx::query_as("SELECT * FROM notifications WHERE reference = $1 FOR UPDATE")
                .bind(reference)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current) = existing else {
            return Ok(StatusUpdate::NotFound);
        };

        if current.status.is_terminal() || current.status == status {
            Self::duplicate_update_warning(&current, status, provider);
            return Ok(StatusUpdate::Duplicate);
        }

        let now = Utc::now();
        let completed_at = status.is_terminal().then_some(now);
        let updated: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = $2,
                updated_at = $3,
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(status)
        .bind(now)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        counter!(
            "courier.callback.applied",
            "provider" => provider.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        tracing::info!(
            notification_id = %updated.id,
            reference,
            status = %status,
            provider,
            "Notification status updated"
        );

        Ok(StatusUpdate::Applied(updated))
    }

    /// Set a notification's status directly by id. Used by the retry
    /// framework's technical-failure escalation; the terminal guard applies.
    pub async fn update_status_by_id(
        pool: &PgPool,
        notification_id: Uuid,
        status: NotificationStatus,
    ) -> Result<Option<Notification>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let existing: Option<Notification> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1 FOR UPDATE")
                .bind(notification_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current) = existing else {
            return Ok(None);
        };
        if current.status.is_terminal() {
            Self::duplicate_update_warning(&current, status, "internal");
            return Ok(None);
        }

        let now = Utc::now();
        let completed_at = status.is_terminal().then_some(now);
        let updated: Notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = $2,
                updated_at = $3,
                completed_at = COALESCE($4, completed_at)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(status)
        .bind(now)
        .bind(completed_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Fetch a notification by its provider reference.
    pub async fn get_by_reference(
        pool: &PgPool,
        reference: &str,
    ) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM notifications WHERE reference = $1")
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    /// Fetch a notification by id.
    pub async fn get_by_id(
        pool: &PgPool,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(pool)
            .await
    }

    fn duplicate_update_warning(
        current: &Notification,
        attempted: NotificationStatus,
        provider: &str,
    ) {
        counter!(
            "courier.callback.duplicate",
            "provider" => provider.to_string()
        )
        .increment(1);
        tracing::info!(
            notification_id = %current.id,
            current_status = %current.status,
            attempted_status = %attempted,
            provider,
            "Duplicate status callback ignored"
        );
    }
}
