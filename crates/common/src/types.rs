use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timestamp format used in every outbound callback payload. Receivers
/// log-compare payloads, so the format is fixed.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Channel a notification is delivered over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Sms,
    Email,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::Sms => write!(f, "sms"),
            NotificationType::Email => write!(f, "email"),
        }
    }
}

/// Canonical notification lifecycle status.
///
/// Allowed transitions form a DAG:
/// `created → sending → {delivered, temporary-failure, permanent-failure,
/// pending, technical-failure}`, with `temporary-failure` free to move on to
/// `delivered` or `permanent-failure` as the provider retries.
/// `delivered`, `permanent-failure` and `technical-failure` are terminal:
/// later provider callbacks for a terminal notification are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NotificationStatus {
    Created,
    Sending,
    Pending,
    Delivered,
    TemporaryFailure,
    PermanentFailure,
    TechnicalFailure,
}

impl NotificationStatus {
    /// Whether this status accepts no further provider-driven transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NotificationStatus::Delivered
                | NotificationStatus::PermanentFailure
                | NotificationStatus::TechnicalFailure
        )
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Created => write!(f, "created"),
            NotificationStatus::Sending => write!(f, "sending"),
            NotificationStatus::Pending => write!(f, "pending"),
            NotificationStatus::Delivered => write!(f, "delivered"),
            NotificationStatus::TemporaryFailure => write!(f, "temporary-failure"),
            NotificationStatus::PermanentFailure => write!(f, "permanent-failure"),
            NotificationStatus::TechnicalFailure => write!(f, "technical-failure"),
        }
    }
}

/// Status value accepted from callers filtering notifications.
///
/// The filter vocabulary is not the storage vocabulary: `failed` is a valid
/// filter but never a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    Created,
    Sending,
    Pending,
    Delivered,
    Failed,
    TemporaryFailure,
    PermanentFailure,
    TechnicalFailure,
}

/// Expand caller-supplied filter statuses into the underlying storage
/// statuses they represent. `failed` covers every failure status. The result
/// is deduplicated; order is unspecified.
pub fn substitute_status(filters: &[StatusFilter]) -> Vec<NotificationStatus> {
    let mut statuses: Vec<NotificationStatus> = Vec::new();
    for filter in filters {
        let expanded: &[NotificationStatus] = match filter {
            StatusFilter::Created => &[NotificationStatus::Created],
            StatusFilter::Sending => &[NotificationStatus::Sending],
            StatusFilter::Pending => &[NotificationStatus::Pending],
            StatusFilter::Delivered => &[NotificationStatus::Delivered],
            StatusFilter::Failed => &[
                NotificationStatus::TemporaryFailure,
                NotificationStatus::PermanentFailure,
                NotificationStatus::TechnicalFailure,
            ],
            StatusFilter::TemporaryFailure => &[NotificationStatus::TemporaryFailure],
            StatusFilter::PermanentFailure => &[NotificationStatus::PermanentFailure],
            StatusFilter::TechnicalFailure => &[NotificationStatus::TechnicalFailure],
        };
        for status in expanded {
            if !statuses.contains(status) {
                statuses.push(*status);
            }
        }
    }
    statuses
}

/// Kind of outbound callback a service can register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallbackType {
    DeliveryStatus,
    Complaint,
    InboundSms,
}

impl std::fmt::Display for CallbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallbackType::DeliveryStatus => write!(f, "delivery_status"),
            CallbackType::Complaint => write!(f, "complaint"),
            CallbackType::InboundSms => write!(f, "inbound_sms"),
        }
    }
}

/// Delivery strategy for a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CallbackChannel {
    Queue,
    Webhook,
}

/// A client service that sends notifications through the platform.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A single outbound notification and its delivery lifecycle state.
///
/// Mutated only through the status store; `reference` correlates provider
/// callbacks to the row and identifies at most one outstanding send.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub service_id: Uuid,
    pub notification_type: NotificationType,
    pub to: String,
    pub status: NotificationStatus,
    pub reference: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outbound webhook configuration owned by a service.
///
/// At most one active configuration per `(service, callback_type)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceCallback {
    pub id: Uuid,
    pub service_id: Uuid,
    pub callback_type: CallbackType,
    pub url: String,
    pub bearer_token: String,
    pub callback_channel: CallbackChannel,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A provider-reported complaint (e.g. spam report) against a delivered
/// notification. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Complaint {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub service_id: Uuid,
    pub complaint_type: Option<String>,
    pub complaint_date: DateTime<Utc>,
    pub feedback_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An SMS message received from an end user, relayed to the owning service.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InboundSms {
    pub id: Uuid,
    pub service_id: Uuid,
    pub source_number: String,
    pub destination_number: String,
    pub content: String,
    pub provider: String,
    pub provider_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Raw provider callback accepted by the API, awaiting async processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundCallbackTask {
    pub provider: String,
    pub body: serde_json::Value,
    pub attempt: u32,
    pub received_at: DateTime<Utc>,
}

/// Encrypted outbound callback awaiting delivery to a service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCallbackTask {
    pub notification_id: Option<Uuid>,
    pub callback_type: CallbackType,
    pub ciphertext: String,
    pub attempt: u32,
}

/// Recipient contact-info resolution work for a single notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactLookupTask {
    pub notification_id: Uuid,
    pub attempt: u32,
}

/// A unit of queued work, tagged so the retry queue can route each task back
/// to its home queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuedTask {
    InboundCallback(InboundCallbackTask),
    ServiceCallback(ServiceCallbackTask),
    ContactLookup(ContactLookupTask),
}

impl QueuedTask {
    /// Queue this task is consumed from.
    pub fn home_queue(&self) -> &'static str {
        match self {
            QueuedTask::InboundCallback(_) => crate::queue::QueueNames::INBOUND,
            QueuedTask::ServiceCallback(_) => crate::queue::QueueNames::SERVICE_CALLBACKS,
            QueuedTask::ContactLookup(_) => crate::queue::QueueNames::INBOUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_filter_expands_to_failure_statuses() {
        let expanded = substitute_status(&[StatusFilter::Failed]);
        assert_eq!(expanded.len(), 3);
        assert!(expanded.contains(&NotificationStatus::TemporaryFailure));
        assert!(expanded.contains(&NotificationStatus::PermanentFailure));
        assert!(expanded.contains(&NotificationStatus::TechnicalFailure));
    }

    #[test]
    fn test_concrete_filter_maps_to_itself() {
        assert_eq!(
            substitute_status(&[StatusFilter::Created]),
            vec![NotificationStatus::Created]
        );
        assert_eq!(
            substitute_status(&[StatusFilter::TechnicalFailure]),
            vec![NotificationStatus::TechnicalFailure]
        );
    }

    #[test]
    fn test_substitute_status_mixed_filters() {
        let expanded = substitute_status(&[StatusFilter::Created, StatusFilter::Pending]);
        assert_eq!(
            expanded,
            vec![NotificationStatus::Created, NotificationStatus::Pending]
        );
    }

    #[test]
    fn test_substitute_status_deduplicates() {
        // technical-failure is covered by `failed` already
        let expanded = substitute_status(&[
            StatusFilter::Failed,
            StatusFilter::Created,
            StatusFilter::TechnicalFailure,
        ]);
        assert_eq!(expanded.len(), 4);
        assert!(expanded.contains(&NotificationStatus::Created));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::PermanentFailure.is_terminal());
        assert!(NotificationStatus::TechnicalFailure.is_terminal());
        assert!(!NotificationStatus::TemporaryFailure.is_terminal());
        assert!(!NotificationStatus::Sending.is_terminal());
        assert!(!NotificationStatus::Pending.is_terminal());
        assert!(!NotificationStatus::Created.is_terminal());
    }

    #[test]
    fn test_status_display_matches_wire_format() {
        assert_eq!(NotificationStatus::TemporaryFailure.to_string(), "temporary-failure");
        assert_eq!(
            serde_json::to_value(NotificationStatus::PermanentFailure).unwrap(),
            serde_json::json!("permanent-failure")
        );
    }

    #[test]
    fn test_queued_task_routes_to_home_queue() {
        let task = QueuedTask::ServiceCallback(ServiceCallbackTask {
            notification_id: Some(Uuid::new_v4()),
            callback_type: CallbackType::DeliveryStatus,
            ciphertext: "abc".to_string(),
            attempt: 1,
        });
        assert_eq!(task.home_queue(), crate::queue::QueueNames::SERVICE_CALLBACKS);
    }
}
