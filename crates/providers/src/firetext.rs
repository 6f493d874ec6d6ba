//! Firetext SMS callback adapter.
//!
//! Firetext posts form-encoded callbacks with a single-digit status code and
//! the correlation key in `reference`.

use courier_common::types::NotificationStatus;

use crate::{CallbackEvent, CallbackParseError, DeliveryReceipt, ProviderAdapter};

const PROVIDER: &str = "Firetext";

pub struct FiretextAdapter;

impl ProviderAdapter for FiretextAdapter {
    fn name(&self) -> &'static str {
        "firetext"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["status", "reference"]
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CallbackEvent, CallbackParseError> {
        let mut missing = Vec::new();
        let status = payload.get("status").and_then(|v| v.as_str());
        let reference = payload.get("reference").and_then(|v| v.as_str());
        if status.is_none() {
            missing.push("status");
        }
        if reference.is_none() {
            missing.push("reference");
        }
        if !missing.is_empty() {
            return Err(CallbackParseError::MissingFields {
                provider: PROVIDER,
                fields: missing,
            });
        }
        let (status, reference) = (status.unwrap(), reference.unwrap());

        if let Some(code) = payload.get("code").and_then(|v| v.as_str()) {
            tracing::info!(status, code, "Firetext callback extended code");
        }

        let canonical = match status {
            "0" => NotificationStatus::Delivered,
            "1" => NotificationStatus::PermanentFailure,
            "2" => NotificationStatus::Pending,
            other => {
                return Err(CallbackParseError::UnknownStatus {
                    provider: PROVIDER,
                    status: other.to_string(),
                    reference: Some(reference.to_string()),
                });
            }
        };

        Ok(CallbackEvent::Delivery(DeliveryReceipt {
            reference: reference.to_string(),
            status: canonical,
        }))
    }
}
