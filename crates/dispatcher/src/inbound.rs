//! Inbound-SMS callback queueing.

use sqlx::PgPool;
use uuid::Uuid;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::{QueueNames, TaskScheduler};
use courier_common::types::{CallbackType, QueuedTask, ServiceCallbackTask};

use crate::dao;
use crate::payloads::{CallbackEnvelope, inbound_sms_payload};

/// Queue delivery of an inbound SMS to the owning service's endpoint.
///
/// A missing inbound message is a caller error and propagates; a missing
/// callback configuration is a no-op. Returns whether a delivery was queued.
pub async fn queue_inbound_sms_callback(
    pool: &PgPool,
    scheduler: &mut dyn TaskScheduler,
    cipher: &PayloadCipher,
    inbound_sms_id: Uuid,
    service_id: Uuid,
) -> anyhow::Result<bool> {
    let message = dao::get_inbound_sms(pool, inbound_sms_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("inbound SMS {inbound_sms_id} does not exist"))?;

    let Some(callback) =
        dao::get_service_callback(pool, service_id, CallbackType::InboundSms).await?
    else {
        return Ok(false);
    };

    let payload = inbound_sms_payload(&message);
    let envelope = CallbackEnvelope {
        url: callback.url.clone(),
        bearer_token: callback.bearer_token.clone(),
        callback_channel: callback.callback_channel,
        payload: serde_json::to_value(&payload)?,
    };

    let task = QueuedTask::ServiceCallback(ServiceCallbackTask {
        notification_id: None,
        callback_type: CallbackType::InboundSms,
        ciphertext: cipher.encrypt(&envelope)?,
        attempt: 0,
    });
    scheduler.enqueue(QueueNames::SERVICE_CALLBACKS, &task).await?;

    tracing::info!(
        inbound_sms_id = %inbound_sms_id,
        service_id = %service_id,
        "Queued inbound SMS callback"
    );
    Ok(true)
}
