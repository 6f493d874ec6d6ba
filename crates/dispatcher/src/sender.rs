//! HTTP transport for outbound callbacks.

use std::time::Duration;

use thiserror::Error;

/// Failure delivering a callback, classified by HTTP response class.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Server-class failure (5xx). The endpoint may recover — retryable.
    #[error("callback endpoint {url} returned server error {status}")]
    ServerError { url: String, status: u16 },

    /// Client-class failure (4xx) — misconfigured URL, revoked token.
    /// The service owner must fix their endpoint; never retried.
    #[error("callback endpoint {url} rejected the request with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("request to callback endpoint {url} timed out")]
    Timeout { url: String },

    #[error("network failure delivering callback to {url}: {detail}")]
    Network { url: String, detail: String },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ServerError { .. }
                | DispatchError::Timeout { .. }
                | DispatchError::Network { .. }
        )
    }
}

/// Posts callback payloads to service endpoints over HTTPS.
pub struct CallbackSender {
    http: reqwest::Client,
}

impl CallbackSender {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// POST `payload` to `url` with the service's bearer token.
    ///
    /// The body is the canonical JSON serialization of the payload —
    /// receivers may log-compare it, so nothing is re-encoded here.
    pub async fn send(
        &self,
        url: &str,
        bearer_token: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(bearer_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(DispatchError::ServerError {
                url: url.to_string(),
                status: status.as_u16(),
            })
        } else {
            Err(DispatchError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }

    /// POST an unauthenticated payload to a platform-internal endpoint.
    pub async fn post_internal(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| classify_transport_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(DispatchError::ServerError {
                url: url.to_string(),
                status: status.as_u16(),
            })
        } else {
            Err(DispatchError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> DispatchError {
    if error.is_timeout() {
        DispatchError::Timeout {
            url: url.to_string(),
        }
    } else {
        DispatchError::Network {
            url: url.to_string(),
            detail: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_payload() -> serde_json::Value {
        serde_json::json!({
            "id": "11111111-2222-3333-4444-555555555555",
            "status": "delivered"
        })
    }

    #[tokio::test]
    async fn test_send_posts_json_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/callback"))
            .and(header("Authorization", "Bearer something_unique"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(make_payload()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/callback", server.uri());
        sender
            .send(&url, "something_unique", &make_payload())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let err = sender
            .send(&server.uri(), "token", &make_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ServerError { status: 500, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let err = sender
            .send(&server.uri(), "token", &make_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 404, .. }));
        assert!(!err.is_retryable());
    }
}
