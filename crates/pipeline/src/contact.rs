//! Recipient contact-info enrichment.
//!
//! Before an SMS or email can be sent, the recipient identifier on the
//! notification may need resolving to a deliverable address through the
//! contact-profile service. The task runs under the retry policy: retryable
//! lookup failures reschedule, non-retryable ones mark the notification
//! technically failed.

use sqlx::PgPool;

use courier_common::queue::TaskScheduler;
use courier_common::types::{ContactLookupTask, NotificationType, QueuedTask};

use crate::identity::ContactLookup;
use crate::retry::{RetryPolicy, TaskError, TaskOutcome, TaskRunError};
use crate::store::StatusStore;

/// Resolve and store the recipient contact address for a notification.
pub async fn lookup_contact_info(
    pool: &PgPool,
    scheduler: &mut dyn TaskScheduler,
    client: &dyn ContactLookup,
    policy: &RetryPolicy,
    task: ContactLookupTask,
) -> Result<TaskOutcome, TaskRunError> {
    let notification_id = task.notification_id;
    let retry_task = QueuedTask::ContactLookup(ContactLookupTask {
        notification_id,
        attempt: task.attempt + 1,
    });

    policy
        .run(
            pool,
            scheduler,
            "lookup-contact-info",
            notification_id,
            task.attempt,
            retry_task,
            || async {
                let notification = StatusStore::get_by_id(pool, notification_id)
                    .await?
                    .ok_or_else(|| {
                        TaskError::RecordNotFound(format!("notification {notification_id}"))
                    })?;

                let address = match notification.notification_type {
                    NotificationType::Email => client.email_for(&notification.to).await?,
                    NotificationType::Sms => client.phone_for(&notification.to).await?,
                };

                sqlx::query(
                    r#"UPDATE notifications SET "to" = $2, updated_at = NOW() WHERE id = $1"#,
                )
                .bind(notification_id)
                .bind(&address)
                .execute(pool)
                .await?;

                tracing::info!(
                    notification_id = %notification_id,
                    "Recipient contact information resolved"
                );
                Ok(())
            },
        )
        .await
}
