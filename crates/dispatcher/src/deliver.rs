//! Worker-side delivery of queued service callbacks.
//!
//! Retry semantics are keyed on the HTTP response class: server errors and
//! transport failures are rescheduled with a delay up to the attempt bound,
//! client errors abandon the delivery immediately and surface a fault.

use std::time::Duration;

use metrics::counter;
use thiserror::Error;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::TaskScheduler;
use courier_common::types::{QueuedTask, ServiceCallbackTask};

use crate::payloads::CallbackEnvelope;
use crate::sender::{CallbackSender, DispatchError};

#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Retried,
}

#[derive(Debug, Error)]
pub enum CallbackDeliveryError {
    /// The endpoint rejected the request with a client error. The service
    /// owner must fix their endpoint; the delivery is abandoned.
    #[error("{source}; delivery abandoned")]
    Rejected {
        #[source]
        source: DispatchError,
    },

    /// Retryable failures exhausted the attempt bound.
    #[error("service callback delivery gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: DispatchError,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Deliver one queued service callback, rescheduling on retryable failure.
pub async fn deliver_service_callback(
    sender: &CallbackSender,
    cipher: &PayloadCipher,
    scheduler: &mut dyn TaskScheduler,
    task: ServiceCallbackTask,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<DeliveryOutcome, CallbackDeliveryError> {
    let envelope: CallbackEnvelope = cipher
        .decrypt(&task.ciphertext)
        .map_err(|e| anyhow::anyhow!("failed to open queued callback payload: {e}"))?;

    let callback_type = task.callback_type;
    match sender
        .send(&envelope.url, &envelope.bearer_token, &envelope.payload)
        .await
    {
        Ok(()) => {
            counter!("courier.service_callback.sent", "callback_type" => callback_type.to_string())
                .increment(1);
            tracing::info!(
                notification_id = ?task.notification_id,
                callback_type = %callback_type,
                channel = ?envelope.callback_channel,
                "Service callback delivered"
            );
            Ok(DeliveryOutcome::Delivered)
        }
        Err(error) if error.is_retryable() => {
            if task.attempt < max_attempts {
                let notification_id = task.notification_id;
                let attempt = task.attempt;
                let retry = QueuedTask::ServiceCallback(ServiceCallbackTask {
                    attempt: attempt + 1,
                    ..task
                });
                scheduler
                    .enqueue_retry(&retry, retry_delay)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to reschedule callback: {e}"))?;
                counter!(
                    "courier.service_callback.retried",
                    "callback_type" => callback_type.to_string()
                )
                .increment(1);
                tracing::warn!(
                    notification_id = ?notification_id,
                    attempt,
                    error = %error,
                    "Service callback failed, rescheduled"
                );
                Ok(DeliveryOutcome::Retried)
            } else {
                counter!(
                    "courier.service_callback.failed",
                    "callback_type" => callback_type.to_string()
                )
                .increment(1);
                Err(CallbackDeliveryError::Exhausted {
                    attempts: task.attempt + 1,
                    source: error,
                })
            }
        }
        Err(error) => {
            counter!(
                "courier.service_callback.failed",
                "callback_type" => callback_type.to_string()
            )
            .increment(1);
            Err(CallbackDeliveryError::Rejected { source: error })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_common::queue::QueueError;
    use courier_common::types::CallbackChannel;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records scheduled tasks instead of touching Redis.
    #[derive(Default)]
    struct RecordingScheduler {
        enqueued: Vec<(String, QueuedTask)>,
        retried: Vec<QueuedTask>,
    }

    #[async_trait]
    impl TaskScheduler for RecordingScheduler {
        async fn enqueue(&mut self, queue: &str, task: &QueuedTask) -> Result<(), QueueError> {
            self.enqueued.push((queue.to_string(), task.clone()));
            Ok(())
        }

        async fn enqueue_retry(
            &mut self,
            task: &QueuedTask,
            _delay: Duration,
        ) -> Result<(), QueueError> {
            self.retried.push(task.clone());
            Ok(())
        }
    }

    fn make_cipher() -> PayloadCipher {
        PayloadCipher::new("test-secret").unwrap()
    }

    fn make_task(cipher: &PayloadCipher, url: &str, attempt: u32) -> ServiceCallbackTask {
        let envelope = CallbackEnvelope {
            url: url.to_string(),
            bearer_token: "something_unique".to_string(),
            callback_channel: CallbackChannel::Webhook,
            payload: serde_json::json!({ "status": "delivered" }),
        };
        ServiceCallbackTask {
            notification_id: Some(Uuid::new_v4()),
            callback_type: courier_common::types::CallbackType::DeliveryStatus,
            ciphertext: cipher.encrypt(&envelope).unwrap(),
            attempt,
        }
    }

    #[tokio::test]
    async fn test_success_delivers_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cipher = make_cipher();
        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let mut scheduler = RecordingScheduler::default();

        let outcome = deliver_service_callback(
            &sender,
            &cipher,
            &mut scheduler,
            make_task(&cipher, &server.uri(), 0),
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(scheduler.retried.is_empty());
    }

    #[tokio::test]
    async fn test_500_response_enqueues_exactly_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let cipher = make_cipher();
        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let mut scheduler = RecordingScheduler::default();

        let outcome = deliver_service_callback(
            &sender,
            &cipher,
            &mut scheduler,
            make_task(&cipher, &server.uri(), 0),
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Retried);
        assert_eq!(scheduler.retried.len(), 1);
        let QueuedTask::ServiceCallback(retried) = &scheduler.retried[0] else {
            panic!("expected a service callback task");
        };
        assert_eq!(retried.attempt, 1);
    }

    #[tokio::test]
    async fn test_404_response_raises_fault_with_zero_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let cipher = make_cipher();
        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let mut scheduler = RecordingScheduler::default();

        let err = deliver_service_callback(
            &sender,
            &cipher,
            &mut scheduler,
            make_task(&cipher, &server.uri(), 0),
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CallbackDeliveryError::Rejected { .. }));
        assert!(scheduler.retried.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_attempts_raise_fault() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cipher = make_cipher();
        let sender = CallbackSender::new(Duration::from_secs(5)).unwrap();
        let mut scheduler = RecordingScheduler::default();

        // Final attempt: the bound is reached, no further reschedule.
        let err = deliver_service_callback(
            &sender,
            &cipher,
            &mut scheduler,
            make_task(&cipher, &server.uri(), 3),
            3,
            Duration::from_secs(60),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CallbackDeliveryError::Exhausted { attempts: 4, .. }));
        assert!(scheduler.retried.is_empty());
    }
}
