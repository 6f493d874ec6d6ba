//! Inbound callback receipt processing.
//!
//! Consumes raw provider callbacks off the inbound queue: normalize through
//! the provider adapter, apply the status transition, and hand successful
//! writes to the service-callback dispatcher. Store failures reschedule with
//! the shared retry bounds; unknown provider statuses are fatal and escalate
//! the notification to `technical-failure`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::{QueueError, TaskScheduler};
use courier_common::types::{
    Complaint, InboundCallbackTask, Notification, NotificationStatus, QueuedTask,
};
use courier_dispatcher::sender::CallbackSender;
use courier_dispatcher::{check_and_queue_callback_task, complaints::publish_complaint};
use courier_providers::{CallbackEvent, CallbackParseError, ComplaintReceipt, ProviderRegistry};

use crate::store::{StatusStore, StatusUpdate};

/// A callback younger than this may reference a notification whose row is
/// not committed yet; `NotFound` within the window is retried rather than
/// written off as stale.
const FRESH_CALLBACK_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub enum ProcessOutcome {
    /// Status written; the service callback (if configured) is queued.
    Applied(Notification),
    /// Late or repeated callback for an already-settled notification.
    Duplicate,
    /// Not a trackable notification (platform-internal sender).
    Ignored,
    /// No notification matches the reference and the callback is old enough
    /// that none ever will. Logged, treated as success.
    MissingNotification,
    /// Transient failure; the task was parked on the retry queue.
    Retried,
    /// Complaint recorded and published.
    ComplaintRecorded(Complaint),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    /// Provider sent a status outside its vocabulary — contract violation.
    #[error("{provider} callback failed: status {status} not found")]
    UnknownProviderStatus { provider: String, status: String },

    /// Payload failed validation that the inbound endpoint should have
    /// caught; surfaced for operator visibility.
    #[error("{0}")]
    InvalidCallback(CallbackParseError),

    /// Transient store failures exhausted the retry bound.
    #[error("callback for reference {reference} gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        reference: String,
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("no adapter registered for provider {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProcessError {
    /// Faults are logged and alerted on, but do not crash the worker;
    /// everything else is an infrastructure or programming failure and
    /// propagates.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ProcessError::UnknownProviderStatus { .. }
                | ProcessError::InvalidCallback(_)
                | ProcessError::RetriesExhausted { .. }
        )
    }
}

/// Processes inbound callback tasks end to end.
pub struct ReceiptProcessor {
    pool: PgPool,
    registry: Arc<ProviderRegistry>,
    cipher: Arc<PayloadCipher>,
    sender: Arc<CallbackSender>,
    operator_complaint_url: Option<String>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ReceiptProcessor {
    pub fn new(
        pool: PgPool,
        registry: Arc<ProviderRegistry>,
        cipher: Arc<PayloadCipher>,
        sender: Arc<CallbackSender>,
        operator_complaint_url: Option<String>,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            pool,
            registry,
            cipher,
            sender,
            operator_complaint_url,
            max_attempts,
            retry_delay,
        }
    }

    pub async fn process(
        &self,
        scheduler: &mut dyn TaskScheduler,
        task: InboundCallbackTask,
    ) -> Result<ProcessOutcome, ProcessError> {
        let adapter = self
            .registry
            .get(&task.provider)
            .ok_or_else(|| ProcessError::UnknownProvider(task.provider.clone()))?;
        let provider = adapter.name();

        let event = match adapter.parse(&task.body) {
            Ok(event) => event,
            Err(CallbackParseError::UnknownStatus {
                provider,
                status,
                reference,
            }) => {
                return self
                    .fail_unknown_status(scheduler, provider, status, reference)
                    .await;
            }
            Err(invalid) => {
                counter!("courier.callback.invalid", "provider" => provider.to_string())
                    .increment(1);
                return Err(ProcessError::InvalidCallback(invalid));
            }
        };

        match event {
            CallbackEvent::Ignored { reason } => {
                tracing::info!(provider, %reason, "Callback acknowledged, nothing to track");
                Ok(ProcessOutcome::Ignored)
            }
            CallbackEvent::Delivery(receipt) => {
                self.apply_delivery(scheduler, task, provider, &receipt.reference, receipt.status)
                    .await
            }
            CallbackEvent::Complaint(receipt) => {
                self.record_complaint(scheduler, provider, receipt).await
            }
        }
    }

    async fn apply_delivery(
        &self,
        scheduler: &mut dyn TaskScheduler,
        task: InboundCallbackTask,
        provider: &'static str,
        reference: &str,
        status: NotificationStatus,
    ) -> Result<ProcessOutcome, ProcessError> {
        match StatusStore::apply_status(&self.pool, reference, status, provider).await {
            Ok(StatusUpdate::Applied(notification)) => {
                check_and_queue_callback_task(
                    &self.pool,
                    scheduler,
                    &self.cipher,
                    &notification,
                )
                .await?;
                Ok(ProcessOutcome::Applied(notification))
            }
            Ok(StatusUpdate::Duplicate) => Ok(ProcessOutcome::Duplicate),
            Ok(StatusUpdate::NotFound) => {
                let age = Utc::now().signed_duration_since(task.received_at);
                let fresh = age.to_std().map_or(true, |age| age < FRESH_CALLBACK_WINDOW);
                if fresh && task.attempt < self.max_attempts {
                    self.reschedule(scheduler, task).await?;
                    Ok(ProcessOutcome::Retried)
                } else {
                    counter!(
                        "courier.callback.missing_notification",
                        "provider" => provider.to_string()
                    )
                    .increment(1);
                    tracing::warn!(
                        provider,
                        reference,
                        status = %status,
                        "Notification not found for reference"
                    );
                    Ok(ProcessOutcome::MissingNotification)
                }
            }
            Err(store_error) => {
                if task.attempt < self.max_attempts {
                    tracing::warn!(
                        provider,
                        reference,
                        attempt = task.attempt,
                        error = %store_error,
                        "Status write failed, rescheduled"
                    );
                    self.reschedule(scheduler, task).await?;
                    Ok(ProcessOutcome::Retried)
                } else {
                    Err(ProcessError::RetriesExhausted {
                        reference: reference.to_string(),
                        attempts: task.attempt + 1,
                        source: store_error,
                    })
                }
            }
        }
    }

    async fn record_complaint(
        &self,
        scheduler: &mut dyn TaskScheduler,
        provider: &'static str,
        receipt: ComplaintReceipt,
    ) -> Result<ProcessOutcome, ProcessError> {
        let Some(notification) =
            StatusStore::get_by_reference(&self.pool, &receipt.reference).await?
        else {
            counter!(
                "courier.callback.missing_notification",
                "provider" => provider.to_string()
            )
            .increment(1);
            tracing::warn!(
                provider,
                reference = %receipt.reference,
                "Complaint references an unknown notification"
            );
            return Ok(ProcessOutcome::MissingNotification);
        };

        let complaint = Complaint {
            id: Uuid::new_v4(),
            notification_id: notification.id,
            service_id: notification.service_id,
            complaint_type: receipt.complaint_type,
            complaint_date: receipt.complaint_date,
            feedback_id: receipt.feedback_id,
            created_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO complaints
                (id, notification_id, service_id, complaint_type, complaint_date,
                 feedback_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(complaint.id)
        .bind(complaint.notification_id)
        .bind(complaint.service_id)
        .bind(&complaint.complaint_type)
        .bind(complaint.complaint_date)
        .bind(&complaint.feedback_id)
        .bind(complaint.created_at)
        .execute(&self.pool)
        .await?;

        counter!("courier.complaint.received", "provider" => provider.to_string()).increment(1);

        publish_complaint(
            &self.pool,
            scheduler,
            &self.cipher,
            &self.sender,
            self.operator_complaint_url.as_deref(),
            &complaint,
            &notification,
        )
        .await?;

        Ok(ProcessOutcome::ComplaintRecorded(complaint))
    }

    /// An unmapped provider status violates the provider contract: mark the
    /// referenced notification technically failed (terminal guard applies),
    /// still notify the owning service, and raise the fault.
    async fn fail_unknown_status(
        &self,
        scheduler: &mut dyn TaskScheduler,
        provider: &'static str,
        status: String,
        reference: Option<String>,
    ) -> Result<ProcessOutcome, ProcessError> {
        counter!("courier.callback.unknown_status", "provider" => provider.to_string())
            .increment(1);

        if let Some(reference) = reference
            && let StatusUpdate::Applied(notification) = StatusStore::apply_status(
                &self.pool,
                &reference,
                NotificationStatus::TechnicalFailure,
                provider,
            )
            .await?
        {
            check_and_queue_callback_task(&self.pool, scheduler, &self.cipher, &notification)
                .await?;
        }

        Err(ProcessError::UnknownProviderStatus {
            provider: provider.to_string(),
            status,
        })
    }

    async fn reschedule(
        &self,
        scheduler: &mut dyn TaskScheduler,
        task: InboundCallbackTask,
    ) -> Result<(), QueueError> {
        let retry = QueuedTask::InboundCallback(InboundCallbackTask {
            attempt: task.attempt + 1,
            ..task
        });
        scheduler.enqueue_retry(&retry, self.retry_delay).await
    }
}
