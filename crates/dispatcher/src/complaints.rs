//! Complaint publication.
//!
//! A complaint always reaches the platform's own operators, whether or not
//! the owning service registered a complaint callback. Operator notification
//! failures are logged, never raised — complaint visibility to the platform
//! must not block the pipeline.

use sqlx::PgPool;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::{QueueNames, TaskScheduler};
use courier_common::types::{
    CallbackType, Complaint, Notification, QueuedTask, ServiceCallbackTask,
};

use crate::payloads::{CallbackEnvelope, complaint_payload};
use crate::sender::CallbackSender;
use crate::dao;

/// Publish a recorded complaint: notify platform operators, then queue the
/// service's complaint callback if one is configured.
pub async fn publish_complaint(
    pool: &PgPool,
    scheduler: &mut dyn TaskScheduler,
    cipher: &PayloadCipher,
    sender: &CallbackSender,
    operator_complaint_url: Option<&str>,
    complaint: &Complaint,
    notification: &Notification,
) -> anyhow::Result<bool> {
    notify_operators(sender, operator_complaint_url, complaint, notification).await;

    let Some(callback) =
        dao::get_service_callback(pool, notification.service_id, CallbackType::Complaint).await?
    else {
        return Ok(false);
    };

    let payload = complaint_payload(complaint, notification);
    let envelope = CallbackEnvelope {
        url: callback.url.clone(),
        bearer_token: callback.bearer_token.clone(),
        callback_channel: callback.callback_channel,
        payload: serde_json::to_value(&payload)?,
    };

    let task = QueuedTask::ServiceCallback(ServiceCallbackTask {
        notification_id: Some(notification.id),
        callback_type: CallbackType::Complaint,
        ciphertext: cipher.encrypt(&envelope)?,
        attempt: 0,
    });
    scheduler.enqueue(QueueNames::SERVICE_CALLBACKS, &task).await?;

    tracing::info!(
        notification_id = %notification.id,
        complaint_id = %complaint.id,
        "Queued complaint callback"
    );
    Ok(true)
}

/// Post the complaint to the platform's internal support channel.
async fn notify_operators(
    sender: &CallbackSender,
    operator_complaint_url: Option<&str>,
    complaint: &Complaint,
    notification: &Notification,
) {
    let Some(url) = operator_complaint_url else {
        tracing::debug!("No operator complaint channel configured");
        return;
    };

    let payload = serde_json::json!({
        "notification_id": notification.id,
        "service_id": notification.service_id,
        "complaint_id": complaint.id,
        "complaint_type": complaint.complaint_type,
        "complaint_date": complaint.complaint_date,
    });

    if let Err(error) = sender.post_internal(url, &payload).await {
        tracing::error!(
            notification_id = %notification.id,
            error = %error,
            "Problem sending complaint to operators"
        );
    }
}
