//! Identity-resolution collaborator contract.
//!
//! External contact-lookup services participate in the retry framework by
//! classifying every failure into exactly two kinds: retryable (timeouts,
//! throttling, upstream 5xx, transient network errors) and non-retryable
//! (malformed identifiers, other upstream 4xx, business-rule violations).
//! Anything a client raises outside these two kinds is a programming defect.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;

/// The two failure kinds an identity client may expose.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("retryable identity lookup failure: {0}")]
    Retryable(String),

    #[error("identity lookup failed permanently: {0}")]
    NonRetryable(String),
}

/// Resolves a recipient identifier to a deliverable contact address.
#[async_trait]
pub trait ContactLookup: Send + Sync {
    async fn email_for(&self, recipient_id: &str) -> Result<String, IdentityError>;

    async fn phone_for(&self, recipient_id: &str) -> Result<String, IdentityError>;
}

/// HTTP client for the contact-profile resolution service.
pub struct ContactProfileClient {
    http: reqwest::Client,
    base_url: String,
}

impl ContactProfileClient {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    async fn fetch_bios(
        &self,
        recipient_id: &str,
        kind: &str,
    ) -> Result<serde_json::Value, IdentityError> {
        let url = format!(
            "{}/contact-information/v1/{}/{}",
            self.base_url, recipient_id, kind
        );

        let response = self.http.get(&url).send().await.map_err(|e| {
            counter!("courier.contact_profile.error", "cause" => "transport").increment(1);
            if e.is_timeout() {
                IdentityError::Retryable(format!("contact profile request timed out: {url}"))
            } else {
                IdentityError::Retryable(format!("transient network error: {e}"))
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            counter!("courier.contact_profile.error", "cause" => status.as_u16().to_string())
                .increment(1);
            return Err(IdentityError::Retryable(format!(
                "contact profile returned {status} for {recipient_id}"
            )));
        }
        if !status.is_success() {
            counter!("courier.contact_profile.error", "cause" => status.as_u16().to_string())
                .increment(1);
            return Err(IdentityError::NonRetryable(format!(
                "contact profile returned {status} for {recipient_id}"
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            IdentityError::NonRetryable(format!("contact profile returned invalid JSON: {e}"))
        })?;

        self.validate_response(&body, recipient_id)?;
        counter!("courier.contact_profile.success").increment(1);
        Ok(body)
    }

    fn validate_response(
        &self,
        body: &serde_json::Value,
        recipient_id: &str,
    ) -> Result<(), IdentityError> {
        if body.get("deceasedDateTime").is_some_and(|v| !v.is_null()) {
            return Err(IdentityError::NonRetryable(format!(
                "recipient {recipient_id} is deceased"
            )));
        }
        match body.get("status").and_then(|v| v.as_str()) {
            Some("COMPLETED_SUCCESS") => Ok(()),
            Some(other) => Err(IdentityError::NonRetryable(format!(
                "contact profile lookup for {recipient_id} finished with status {other}"
            ))),
            None => Err(IdentityError::NonRetryable(format!(
                "contact profile response for {recipient_id} is missing a status"
            ))),
        }
    }

    fn first_bio_field(
        body: &serde_json::Value,
        field: &str,
        recipient_id: &str,
    ) -> Result<String, IdentityError> {
        body.get("bios")
            .and_then(|v| v.as_array())
            .and_then(|bios| bios.first())
            .and_then(|bio| bio.get(field))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                IdentityError::NonRetryable(format!(
                    "no contact record found for {recipient_id}"
                ))
            })
    }
}

#[async_trait]
impl ContactLookup for ContactProfileClient {
    async fn email_for(&self, recipient_id: &str) -> Result<String, IdentityError> {
        let body = self.fetch_bios(recipient_id, "emails").await?;
        Self::first_bio_field(&body, "emailAddressText", recipient_id)
    }

    async fn phone_for(&self, recipient_id: &str) -> Result<String, IdentityError> {
        let body = self.fetch_bios(recipient_id, "telephones").await?;
        Self::first_bio_field(&body, "phoneNumber", recipient_id)
    }
}
