//! Outbound service-callback delivery.
//!
//! Services register webhook endpoints per callback type (delivery status,
//! complaint, inbound SMS). When a notification reaches a new status the
//! pipeline enqueues an encrypted payload here; the callback worker posts it
//! with the service's bearer token and retries on server-class failures only.

pub mod complaints;
pub mod dao;
pub mod deliver;
pub mod inbound;
pub mod payloads;
pub mod sender;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::{QueueNames, TaskScheduler};
use courier_common::types::{CallbackType, Notification, QueuedTask, ServiceCallbackTask};
use sqlx::PgPool;

use crate::payloads::{CallbackEnvelope, delivery_status_payload};

/// Look up the service's delivery-status callback configuration and, if one
/// exists, enqueue an encrypted status-change payload for delivery.
///
/// Most services have no callback configured; that case is a cheap no-op.
/// Returns whether a delivery was enqueued.
pub async fn check_and_queue_callback_task(
    pool: &PgPool,
    scheduler: &mut dyn TaskScheduler,
    cipher: &PayloadCipher,
    notification: &Notification,
) -> anyhow::Result<bool> {
    let Some(callback) =
        dao::get_service_callback(pool, notification.service_id, CallbackType::DeliveryStatus)
            .await?
    else {
        return Ok(false);
    };

    let payload = delivery_status_payload(notification);
    let envelope = CallbackEnvelope {
        url: callback.url.clone(),
        bearer_token: callback.bearer_token.clone(),
        callback_channel: callback.callback_channel,
        payload: serde_json::to_value(&payload)?,
    };

    let task = QueuedTask::ServiceCallback(ServiceCallbackTask {
        notification_id: Some(notification.id),
        callback_type: CallbackType::DeliveryStatus,
        ciphertext: cipher.encrypt(&envelope)?,
        attempt: 0,
    });
    scheduler.enqueue(QueueNames::SERVICE_CALLBACKS, &task).await?;

    tracing::info!(
        notification_id = %notification.id,
        status = %notification.status,
        "Queued delivery-status callback"
    );
    Ok(true)
}
