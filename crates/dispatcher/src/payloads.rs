//! Callback payload construction.
//!
//! Payload field order and timestamp formatting are fixed: receivers verify
//! and log-compare the serialized body, so the structs below are the wire
//! contract. serde serializes fields in declaration order — do not reorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courier_common::types::{
    CallbackChannel, Complaint, DATETIME_FORMAT, InboundSms, Notification, NotificationStatus,
    NotificationType,
};

/// Everything the callback worker needs to deliver one callback. Sealed with
/// the payload cipher while queued — it carries the service's bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackEnvelope {
    pub url: String,
    pub bearer_token: String,
    pub callback_channel: CallbackChannel,
    pub payload: serde_json::Value,
}

/// Status-change payload posted to a service's delivery-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatusPayload {
    pub id: Uuid,
    pub reference: Option<String>,
    pub to: String,
    pub status: NotificationStatus,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub sent_at: Option<String>,
    pub notification_type: NotificationType,
}

/// Complaint payload posted to a service's complaint endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintPayload {
    pub notification_id: Uuid,
    pub complaint_id: Uuid,
    pub reference: Option<String>,
    pub to: String,
    pub complaint_date: String,
}

/// Payload posted to a service's inbound-SMS endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundSmsPayload {
    pub id: Uuid,
    pub source_number: String,
    pub destination_number: String,
    pub message: String,
    pub date_received: Option<String>,
    pub provider: String,
}

pub fn delivery_status_payload(notification: &Notification) -> DeliveryStatusPayload {
    DeliveryStatusPayload {
        id: notification.id,
        reference: notification.reference.clone(),
        to: notification.to.clone(),
        status: notification.status,
        created_at: format_timestamp(notification.created_at),
        completed_at: notification.completed_at.map(format_timestamp),
        sent_at: notification.sent_at.map(format_timestamp),
        notification_type: notification.notification_type,
    }
}

pub fn complaint_payload(complaint: &Complaint, notification: &Notification) -> ComplaintPayload {
    ComplaintPayload {
        notification_id: notification.id,
        complaint_id: complaint.id,
        reference: notification.reference.clone(),
        to: notification.to.clone(),
        complaint_date: format_timestamp(complaint.complaint_date),
    }
}

pub fn inbound_sms_payload(message: &InboundSms) -> InboundSmsPayload {
    InboundSmsPayload {
        id: message.id,
        source_number: message.source_number.clone(),
        destination_number: message.destination_number.clone(),
        message: message.content.clone(),
        date_received: message.provider_date.map(format_timestamp),
        provider: message.provider.clone(),
    }
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_notification() -> Notification {
        let ts = Utc.with_ymd_and_hms(2017, 6, 20, 0, 0, 0).unwrap();
        Notification {
            id: Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap(),
            service_id: Uuid::new_v4(),
            notification_type: NotificationType::Email,
            to: "recipient1@example.com".to_string(),
            status: NotificationStatus::PermanentFailure,
            reference: Some("ref1".to_string()),
            sent_at: Some(ts),
            created_at: ts,
            updated_at: Some(ts),
            completed_at: Some(ts),
        }
    }

    #[test]
    fn test_delivery_status_payload_serializes_with_stable_field_order() {
        let payload = delivery_status_payload(&make_notification());
        let serialized = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            serialized,
            "{\"id\":\"11111111-2222-3333-4444-555555555555\",\
             \"reference\":\"ref1\",\
             \"to\":\"recipient1@example.com\",\
             \"status\":\"permanent-failure\",\
             \"created_at\":\"2017-06-20T00:00:00.000000Z\",\
             \"completed_at\":\"2017-06-20T00:00:00.000000Z\",\
             \"sent_at\":\"2017-06-20T00:00:00.000000Z\",\
             \"notification_type\":\"email\"}"
        );
    }

    #[test]
    fn test_delivery_status_payload_allows_missing_sent_at() {
        let mut notification = make_notification();
        notification.sent_at = None;
        notification.status = NotificationStatus::TechnicalFailure;
        let payload = delivery_status_payload(&notification);
        assert_eq!(payload.sent_at, None);
        let serialized = serde_json::to_string(&payload).unwrap();
        assert!(serialized.contains("\"sent_at\":null"));
    }

    #[test]
    fn test_complaint_payload_fields() {
        let notification = make_notification();
        let complaint = Complaint {
            id: Uuid::new_v4(),
            notification_id: notification.id,
            service_id: notification.service_id,
            complaint_type: Some("abuse".to_string()),
            complaint_date: Utc.with_ymd_and_hms(2001, 1, 1, 12, 0, 0).unwrap(),
            feedback_id: Some("feedback-1".to_string()),
            created_at: Utc::now(),
        };
        let payload = complaint_payload(&complaint, &notification);
        assert_eq!(payload.notification_id, notification.id);
        assert_eq!(payload.complaint_id, complaint.id);
        assert_eq!(payload.complaint_date, "2001-01-01T12:00:00.000000Z");
    }
}
