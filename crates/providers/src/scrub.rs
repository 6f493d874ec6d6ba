//! Recipient PII scrubbing for bounce and complaint payloads.
//!
//! Bounce and complaint callbacks embed raw recipient email addresses. Those
//! payloads are logged and persisted for diagnosis, so every address is
//! replaced with a redaction marker first. Structural fields are left intact.

/// Marker substituted for scrubbed recipient addresses.
pub const REDACTION_MARKER: &str = "<redacted>";

/// Replace every email address anywhere in `value` with the redaction
/// marker, in place.
pub fn scrub_recipient_emails(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if looks_like_email(s) {
                *s = REDACTION_MARKER.to_string();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                scrub_recipient_emails(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                scrub_recipient_emails(item);
            }
        }
        _ => {}
    }
}

/// Copy of `value` with every email address scrubbed, for logging.
pub fn scrubbed(value: &serde_json::Value) -> serde_json::Value {
    let mut copy = value.clone();
    scrub_recipient_emails(&mut copy);
    copy
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrub_removes_address_from_entire_serialized_form() {
        let mut payload = serde_json::json!({
            "notificationType": "Complaint",
            "complaint": {
                "complainedRecipients": [
                    { "emailAddress": "recipient1@example.com" }
                ],
                "feedbackId": "feedback-1",
                "complaintFeedbackType": "abuse"
            },
            "mail": {
                "messageId": "ref1",
                "source": "sender@service.example",
                "destination": ["recipient1@example.com"]
            }
        });

        scrub_recipient_emails(&mut payload);
        let serialized = serde_json::to_string(&payload).unwrap();
        assert!(!serialized.contains("recipient1@example.com"));
        assert!(!serialized.contains("sender@service.example"));
    }

    #[test]
    fn test_scrub_preserves_structural_fields() {
        let mut payload = serde_json::json!({
            "bounce": {
                "bounceType": "Permanent",
                "bouncedRecipients": [
                    { "emailAddress": "bounce@simulator.amazonses.com", "status": "5.1.1" }
                ]
            },
            "mail": { "messageId": "ref1" }
        });

        scrub_recipient_emails(&mut payload);
        assert_eq!(payload["bounce"]["bounceType"], "Permanent");
        assert_eq!(payload["bounce"]["bouncedRecipients"][0]["status"], "5.1.1");
        assert_eq!(payload["mail"]["messageId"], "ref1");
        assert_eq!(
            payload["bounce"]["bouncedRecipients"][0]["emailAddress"],
            REDACTION_MARKER
        );
    }

    #[test]
    fn test_non_email_strings_untouched() {
        let mut payload = serde_json::json!({
            "note": "user @mentioned someone",
            "version": "1.0"
        });
        let before = payload.clone();
        scrub_recipient_emails(&mut payload);
        assert_eq!(payload, before);
    }
}
