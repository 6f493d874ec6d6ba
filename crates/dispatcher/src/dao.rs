//! Service-callback configuration lookups.
//!
//! Callback configurations are created by service administrators elsewhere;
//! the pipeline only reads them. At most one active configuration exists per
//! `(service, callback_type)`.

use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::{CallbackType, InboundSms, ServiceCallback};

/// Fetch the service's callback configuration of the given type, if any.
pub async fn get_service_callback(
    pool: &PgPool,
    service_id: Uuid,
    callback_type: CallbackType,
) -> Result<Option<ServiceCallback>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT *
        FROM service_callbacks
        WHERE service_id = $1
          AND callback_type = $2
        "#,
    )
    .bind(service_id)
    .bind(callback_type)
    .fetch_optional(pool)
    .await
}

/// Fetch an inbound SMS message by id.
pub async fn get_inbound_sms(
    pool: &PgPool,
    inbound_sms_id: Uuid,
) -> Result<Option<InboundSms>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM inbound_sms WHERE id = $1")
        .bind(inbound_sms_id)
        .fetch_optional(pool)
        .await
}
