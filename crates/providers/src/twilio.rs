//! Twilio SMS callback adapter.
//!
//! Twilio posts form-encoded status callbacks; `MessageSid` is the reference
//! and `MessageStatus` carries the provider status.

use courier_common::types::NotificationStatus;

use crate::{CallbackEvent, CallbackParseError, DeliveryReceipt, ProviderAdapter};

const PROVIDER: &str = "Twilio";

pub struct TwilioAdapter;

impl ProviderAdapter for TwilioAdapter {
    fn name(&self) -> &'static str {
        "twilio"
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["MessageStatus", "MessageSid"]
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CallbackEvent, CallbackParseError> {
        let mut missing = Vec::new();
        let status = payload.get("MessageStatus").and_then(|v| v.as_str());
        let reference = payload.get("MessageSid").and_then(|v| v.as_str());
        if status.is_none() {
            missing.push("MessageStatus");
        }
        if reference.is_none() {
            missing.push("MessageSid");
        }
        if !missing.is_empty() {
            return Err(CallbackParseError::MissingFields {
                provider: PROVIDER,
                fields: missing,
            });
        }
        let (status, reference) = (status.unwrap(), reference.unwrap());

        let canonical = match status {
            "queued" | "accepted" | "sending" | "sent" => NotificationStatus::Sending,
            "delivered" => NotificationStatus::Delivered,
            "undelivered" => NotificationStatus::PermanentFailure,
            "failed" => NotificationStatus::TechnicalFailure,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn make_payload(status: &str) -> serde_json::Value {
        serde_json::json!({
            "MessageSid": "SM1234567890",
            "MessageStatus": status,
            "To": "+16502532222"
        })
    }

    fn parse_status(status: &str) -> NotificationStatus {
        let event = TwilioAdapter.parse(&make_payload(status)).unwrap();
        let CallbackEvent::Delivery(receipt) = event else {
            panic!("expected delivery event");
        };
        receipt.status
    }

    #[test]
    fn test_in_flight_statuses_map_to_sending() {
        for status in ["queued", "accepted", "sending", "sent"] {
            assert_eq!(parse_status(status), NotificationStatus::Sending);
        }
    }

    #[test]
    fn test_delivered_maps_to_delivered() {
        assert_eq!(parse_status("delivered"), NotificationStatus::Delivered);
    }

    #[test]
    fn test_undelivered_maps_to_permanent_failure() {
        assert_eq!(parse_status("undelivered"), NotificationStatus::PermanentFailure);
    }

    #[test]
    fn test_failed_maps_to_technical_failure() {
        assert_eq!(parse_status("failed"), NotificationStatus::TechnicalFailure);
    }

    #[test]
    fn test_unknown_status_is_fatal() {
        let err = TwilioAdapter.parse(&make_payload("exploded")).unwrap_err();
        match err {
            CallbackParseError::UnknownStatus { status, reference, .. } => {
                assert_eq!(status, "exploded");
                assert_eq!(reference.as_deref(), Some("SM1234567890"));
            }
            other => panic!("expected UnknownStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let err = TwilioAdapter.parse(&serde_json::json!({})).unwrap_err();
        let CallbackParseError::MissingFields { fields, .. } = err else {
            panic!("expected MissingFields");
        };
        assert_eq!(fields, vec!["MessageStatus", "MessageSid"]);
    }
}
