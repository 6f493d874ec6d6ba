//! MMG SMS callback adapter.
//!
//! MMG posts JSON with a numeric status (sometimes stringified) and the
//! correlation key in `CID`.

use courier_common::types::NotificationStatus;

use crate::{CallbackEvent, CallbackParseError, DeliveryReceipt, ProviderAdapter};

const PROVIDER: &str = "MMG";

pub struct MmgAdapter;

impl ProviderAdapter for MmgAdapter {
    fn name(&self) -> &'static str {
        "mmg"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["status", "CID"]
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CallbackEvent, CallbackParseError> {
        let mut missing = Vec::new();
        let status = payload.get("status").map(stringify_status);
        let reference = payload.get("CID").and_then(|v| v.as_str());
        if status.is_none() {
            missing.push("status");
        }
        if reference.is_none() {
            missing.push("CID");
        }
        if !missing.is_empty() {
            return Err(CallbackParseError::MissingFields {
                provider: PROVIDER,
                fields: missing,
            });
        }
        let (status, reference) = (status.unwrap(), reference.unwrap());

        let canonical = match status.as_str() {
            "2" => NotificationStatus::PermanentFailure,
            "3" => NotificationStatus::Delivered,
            "4" => NotificationStatus::TemporaryFailure,
            "5" => NotificationStatus::PermanentFailure,
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

/// MMG sends `status` as either a JSON number or a string.
fn stringify_status(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
