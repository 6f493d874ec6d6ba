pub mod firetext;
pub mod mmg;
pub mod scrub;
pub mod ses;
pub mod twilio;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use courier_common::types::NotificationStatus;

/// A delivery receipt normalized out of a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider-assigned correlation key for the outstanding send.
    pub reference: String,
    pub status: NotificationStatus,
}

/// A complaint (e.g. spam report) normalized out of a provider callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintReceipt {
    pub reference: String,
    pub complaint_type: Option<String>,
    pub feedback_id: Option<String>,
    pub complaint_date: DateTime<Utc>,
}

/// What a provider callback turned out to describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    Delivery(DeliveryReceipt),
    Complaint(ComplaintReceipt),
    /// A callback acknowledged successfully but tracking nothing — e.g. mail
    /// sent by the platform itself (verification codes, invitations).
    Ignored { reason: String },
}

#[derive(Debug, Error)]
pub enum CallbackParseError {
    #[error("{provider} callback failed: missing fields {fields:?}")]
    MissingFields {
        provider: &'static str,
        fields: Vec<&'static str>,
    },

    #[error("{provider} callback failed: {message}")]
    InvalidPayload {
        provider: &'static str,
        message: String,
    },

    /// The provider sent a status code outside its documented vocabulary.
    /// This is a contract violation, never retried.
    #[error("{provider} callback failed: status {status} not found")]
    UnknownStatus {
        provider: &'static str,
        status: String,
        reference: Option<String>,
    },
}

impl CallbackParseError {
    /// One message per problem, suitable for a structured 4xx error list.
    pub fn messages(&self) -> Vec<String> {
        match self {
            CallbackParseError::MissingFields { provider, fields } => fields
                .iter()
                .map(|field| format!("{provider} callback failed: {field} missing"))
                .collect(),
            other => vec![other.to_string()],
        }
    }
}

/// Trait that all provider callback adapters must implement.
pub trait ProviderAdapter: Send + Sync {
    /// Provider name as used in queue messages and metrics tags.
    fn name(&self) -> &'static str;

    /// Top-level fields the inbound endpoint checks synchronously before
    /// enqueueing the callback.
    fn required_fields(&self) -> &'static [&'static str];

    /// Normalize a raw callback payload into a canonical event.
    fn parse(&self, payload: &serde_json::Value) -> Result<CallbackEvent, CallbackParseError>;
}

/// Senders the platform itself uses; callbacks referencing them are
/// acknowledged but tracked nowhere.
#[derive(Debug, Clone)]
pub struct PlatformSenders {
    pub verify_sender: String,
    pub invitation_sender: String,
}

/// Registry of all provider adapters, keyed by provider name.
pub struct ProviderRegistry {
    adapters: HashMap<&'static str, Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create a registry with every supported provider registered.
    pub fn new(senders: PlatformSenders) -> Self {
        let mut adapters: HashMap<&'static str, Box<dyn ProviderAdapter>> = HashMap::new();
        for adapter in [
            Box::new(ses::SesAdapter::new(senders)) as Box<dyn ProviderAdapter>,
            Box::new(twilio::TwilioAdapter),
            Box::new(mmg::MmgAdapter),
            Box::new(firetext::FiretextAdapter),
        ] {
            adapters.insert(adapter.name(), adapter);
        }
        Self { adapters }
    }

    pub fn get(&self, name: &str) -> Option<&dyn ProviderAdapter> {
        self.adapters.get(name).map(|a| a.as_ref())
    }
}

/// Check that every required field is present and non-empty, returning one
/// message per missing field (all of them, not just the first).
pub fn validate_callback_data(
    payload: &serde_json::Value,
    fields: &[&str],
    provider: &str,
) -> Vec<String> {
    let mut errors = Vec::new();
    for field in fields {
        let present = match payload.get(field) {
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Null) | None => false,
            Some(_) => true,
        };
        if !present {
            errors.push(format!("{provider} callback failed: {field} missing"));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_senders() -> PlatformSenders {
        PlatformSenders {
            verify_sender: "verify@courier.example".to_string(),
            invitation_sender: "invite@courier.example".to_string(),
        }
    }

    #[test]
    fn test_registry_knows_all_providers() {
        let registry = ProviderRegistry::new(make_senders());
        for name in ["ses", "twilio", "mmg", "firetext"] {
            assert!(registry.get(name).is_some(), "missing adapter for {name}");
        }
        assert!(registry.get("carrier-pigeon").is_none());
    }

    #[test]
    fn test_validate_callback_data_lists_every_missing_field() {
        let payload = serde_json::json!({ "MSISDN": "447700900111" });
        let errors = validate_callback_data(&payload, &["status", "CID"], "MMG");
        assert_eq!(
            errors,
            vec![
                "MMG callback failed: status missing",
                "MMG callback failed: CID missing",
            ]
        );
    }

    #[test]
    fn test_validate_callback_data_rejects_empty_string() {
        let payload = serde_json::json!({ "reference": "", "status": "0" });
        let errors = validate_callback_data(&payload, &["status", "reference"], "Firetext");
        assert_eq!(errors, vec!["Firetext callback failed: reference missing"]);
    }

    #[test]
    fn test_validate_callback_data_accepts_complete_payload() {
        let payload = serde_json::json!({ "status": 3, "CID": "ref1" });
        assert!(validate_callback_data(&payload, &["status", "CID"], "MMG").is_empty());
    }

    #[test]
    fn test_missing_fields_error_produces_one_message_per_field() {
        let err = CallbackParseError::MissingFields {
            provider: "MMG",
            fields: vec!["status", "CID"],
        };
        assert_eq!(err.messages().len(), 2);
    }
}
