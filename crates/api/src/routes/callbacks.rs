//! Inbound provider callback endpoints, one per provider.
//!
//! Each endpoint validates field presence synchronously — reporting every
//! missing field, not just the first — then enqueues the raw payload and
//! acknowledges immediately. The status write happens asynchronously in the
//! worker; providers only ever see a 2xx or a 4xx here.

use std::collections::HashMap;

use axum::extract::State;
use axum::routing::post;
use axum::{Form, Json, Router};
use chrono::Utc;

use courier_common::error::AppError;
use courier_common::queue::{QueueNames, TaskScheduler};
use courier_common::types::{InboundCallbackTask, QueuedTask};
use courier_providers::validate_callback_data;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications/email/ses", post(ses_callback))
        .route("/notifications/sms/twilio", post(twilio_callback))
        .route("/notifications/sms/mmg", post(mmg_callback))
        .route("/notifications/sms/firetext", post(firetext_callback))
}

/// POST /notifications/email/ses — SES delivery/bounce/complaint callbacks.
///
/// The SNS envelope embeds the actual message as a JSON string, so the
/// nested document is unwrapped far enough to check `notificationType`
/// before the payload is accepted.
async fn ses_callback(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut errors = validate_callback_data(&body, &["Message"], "SES");

    if errors.is_empty() {
        let message = match body.get("Message") {
            Some(serde_json::Value::String(raw)) => serde_json::from_str(raw)
                .map_err(|_| vec!["SES callback failed: invalid JSON given".to_string()]),
            Some(value @ serde_json::Value::Object(_)) => Ok(value.clone()),
            _ => Err(vec!["SES callback failed: Message missing".to_string()]),
        };
        match message {
            Ok(message) => {
                errors.extend(validate_callback_data(&message, &["notificationType"], "SES"));
            }
            Err(message_errors) => errors.extend(message_errors),
        }
    }

    if !errors.is_empty() {
        return Err(AppError::CallbackValidation("SES", errors));
    }

    enqueue_callback(&state, "ses", body).await?;
    Ok(Json(serde_json::json!({
        "result": "success",
        "message": "SES callback succeeded"
    })))
}

/// POST /notifications/sms/twilio — Twilio message status callbacks
/// (form-encoded).
async fn twilio_callback(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = form_to_json(form);
    let errors = validate_callback_data(&body, &["MessageStatus", "MessageSid"], "Twilio");
    if !errors.is_empty() {
        return Err(AppError::CallbackValidation("Twilio", errors));
    }

    enqueue_callback(&state, "twilio", body).await?;
    Ok(Json(serde_json::json!({
        "result": "success",
        "message": "Twilio callback succeeded"
    })))
}

/// POST /notifications/sms/mmg — MMG delivery receipts (JSON).
async fn mmg_callback(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let errors = validate_callback_data(&body, &["status", "CID"], "MMG");
    if !errors.is_empty() {
        return Err(AppError::CallbackValidation("MMG", errors));
    }

    enqueue_callback(&state, "mmg", body).await?;
    Ok(Json(serde_json::json!({
        "result": "success",
        "message": "MMG callback succeeded"
    })))
}

/// POST /notifications/sms/firetext — Firetext delivery receipts
/// (form-encoded).
async fn firetext_callback(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = form_to_json(form);
    let errors = validate_callback_data(&body, &["status", "reference"], "Firetext");
    if !errors.is_empty() {
        return Err(AppError::CallbackValidation("Firetext", errors));
    }

    enqueue_callback(&state, "firetext", body).await?;
    Ok(Json(serde_json::json!({
        "result": "success",
        "message": "Firetext callback succeeded"
    })))
}

async fn enqueue_callback(
    state: &AppState,
    provider: &str,
    body: serde_json::Value,
) -> Result<(), AppError> {
    let task = QueuedTask::InboundCallback(InboundCallbackTask {
        provider: provider.to_string(),
        body,
        attempt: 0,
        received_at: Utc::now(),
    });

    let mut queue = state.queue.clone();
    queue.enqueue(QueueNames::INBOUND, &task).await?;

    tracing::info!(provider, "Inbound callback accepted and queued");
    Ok(())
}

fn form_to_json(form: HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        form.into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect(),
    )
}
