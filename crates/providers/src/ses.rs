//! SES email callback adapter.
//!
//! SES callbacks arrive wrapped in an SNS envelope whose `Message` field is
//! an embedded JSON document. The embedded `notificationType` selects the
//! canonical status; bounces additionally carry a `bounceType` distinguishing
//! permanent from transient failure. The mail `messageId` is the reference.

use chrono::{DateTime, Utc};

use courier_common::types::NotificationStatus;

use crate::scrub::scrubbed;
use crate::{
    CallbackEvent, CallbackParseError, ComplaintReceipt, DeliveryReceipt, PlatformSenders,
    ProviderAdapter,
};

const PROVIDER: &str = "SES";

pub struct SesAdapter {
    senders: PlatformSenders,
}

impl SesAdapter {
    pub fn new(senders: PlatformSenders) -> Self {
        Self { senders }
    }

    /// Whether `source` is a platform-internal sender (verification or
    /// invitation mail) whose callbacks track nothing.
    fn is_platform_sender(&self, source: &str) -> bool {
        source == self.senders.verify_sender || source == self.senders.invitation_sender
    }
}

impl ProviderAdapter for SesAdapter {
    fn name(&self) -> &'static str {
        "ses"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["Message"]
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CallbackEvent, CallbackParseError> {
        let message = unwrap_envelope(payload)?;

        let notification_type = message
            .get("notificationType")
            .and_then(|v| v.as_str())
            .ok_or(CallbackParseError::MissingFields {
                provider: PROVIDER,
                fields: vec!["notificationType"],
            })?;

        let mail = message.get("mail").ok_or(CallbackParseError::MissingFields {
            provider: PROVIDER,
            fields: vec!["mail"],
        })?;

        if let Some(source) = mail.get("source").and_then(|v| v.as_str())
            && self.is_platform_sender(source)
        {
            return Ok(CallbackEvent::Ignored {
                reason: format!("mail from platform sender, type {notification_type}"),
            });
        }

        let reference = mail
            .get("messageId")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match notification_type {
            "Delivery" => Ok(CallbackEvent::Delivery(DeliveryReceipt {
                reference: reference.ok_or(missing_message_id())?,
                status: NotificationStatus::Delivered,
            })),
            "Bounce" => {
                tracing::info!(
                    payload = %scrubbed(&message),
                    "SES bounce callback received"
                );
                let bounce_type = message
                    .get("bounce")
                    .and_then(|b| b.get("bounceType"))
                    .and_then(|v| v.as_str());
                let status = match bounce_type {
                    Some("Permanent") => NotificationStatus::PermanentFailure,
                    _ => NotificationStatus::TemporaryFailure,
                };
                Ok(CallbackEvent::Delivery(DeliveryReceipt {
                    reference: reference.ok_or(missing_message_id())?,
                    status,
                }))
            }
            "Complaint" => {
                tracing::info!(
                    payload = %scrubbed(&message),
                    "SES complaint callback received"
                );
                let complaint = message
                    .get("complaint")
                    .ok_or(CallbackParseError::MissingFields {
                        provider: PROVIDER,
                        fields: vec!["complaint"],
                    })?;
                Ok(CallbackEvent::Complaint(ComplaintReceipt {
                    reference: reference.ok_or(missing_message_id())?,
                    complaint_type: complaint
                        .get("complaintFeedbackType")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    feedback_id: complaint
                        .get("feedbackId")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    complaint_date: parse_timestamp(complaint.get("timestamp")),
                }))
            }
            other => Err(CallbackParseError::UnknownStatus {
                provider: PROVIDER,
                status: other.to_string(),
                reference,
            }),
        }
    }
}

/// Pull the embedded message out of the SNS envelope. `Message` may arrive
/// as a JSON string needing a nested parse, or already decoded.
fn unwrap_envelope(payload: &serde_json::Value) -> Result<serde_json::Value, CallbackParseError> {
    match payload.get("Message") {
        Some(serde_json::Value::String(raw)) => {
            serde_json::from_str(raw).map_err(|_| CallbackParseError::InvalidPayload {
                provider: PROVIDER,
                message: "Message is not valid JSON".to_string(),
            })
        }
        Some(value @ serde_json::Value::Object(_)) => Ok(value.clone()),
        _ => Err(CallbackParseError::MissingFields {
            provider: PROVIDER,
            fields: vec!["Message"],
        }),
    }
}

fn parse_timestamp(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn missing_message_id() -> CallbackParseError {
    CallbackParseError::MissingFields {
        provider: PROVIDER,
        fields: vec!["mail.messageId"],
    }
}
