//! Queue consumer loops.
//!
//! Three independent loops share nothing but the persistent store: inbound
//! callback processing, service-callback delivery, and retry promotion.
//! Faults (exhausted retries, rejected callbacks, provider contract
//! violations) are logged and counted — the loop continues. Anything
//! unclassified is a programming defect and propagates, crashing the worker
//! loudly rather than being absorbed.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use sqlx::PgPool;

use courier_common::encryption::PayloadCipher;
use courier_common::queue::{QueueNames, TaskQueue, TaskScheduler};
use courier_common::types::QueuedTask;
use courier_dispatcher::deliver::{CallbackDeliveryError, deliver_service_callback};
use courier_dispatcher::sender::CallbackSender;
use courier_pipeline::contact::lookup_contact_info;
use courier_pipeline::identity::ContactLookup;
use courier_pipeline::process::ReceiptProcessor;
use courier_pipeline::retry::{RetryPolicy, TaskRunError};

/// How long each `BRPOP` blocks before the loop re-checks for shutdown.
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Consume the inbound queue: provider callbacks and contact lookups.
pub async fn run_inbound_loop(
    pool: PgPool,
    mut queue: TaskQueue,
    processor: ReceiptProcessor,
    contact_client: Option<Arc<dyn ContactLookup>>,
    lookup_policy: RetryPolicy,
) -> anyhow::Result<()> {
    tracing::info!(queue = QueueNames::INBOUND, "Inbound consumer started");

    loop {
        let Some(task) = queue.pop(QueueNames::INBOUND, POP_TIMEOUT).await? else {
            continue;
        };

        match task {
            QueuedTask::InboundCallback(task) => {
                let mut scheduler = queue.clone();
                match processor.process(&mut scheduler, task).await {
                    Ok(outcome) => {
                        tracing::debug!(outcome = ?outcome, "Inbound callback processed");
                    }
                    Err(error) if error.is_fault() => {
                        counter!("courier.task.fault", "task" => "process-inbound-callback")
                            .increment(1);
                        tracing::error!(error = %error, "Inbound callback processing failed");
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            QueuedTask::ContactLookup(task) => {
                let Some(client) = contact_client.as_deref() else {
                    anyhow::bail!(
                        "contact lookup task received but no contact profile service is configured"
                    );
                };
                let mut scheduler = queue.clone();
                match lookup_contact_info(&pool, &mut scheduler, client, &lookup_policy, task).await
                {
                    Ok(outcome) => {
                        tracing::debug!(outcome = ?outcome, "Contact lookup processed");
                    }
                    Err(TaskRunError::Fault(fault)) => {
                        counter!("courier.task.fault", "task" => "lookup-contact-info")
                            .increment(1);
                        tracing::error!(error = %fault, "Contact lookup failed terminally");
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            QueuedTask::ServiceCallback(_) => {
                anyhow::bail!("service callback task routed to the inbound queue");
            }
        }
    }
}

/// Consume the service-callbacks queue and deliver outbound webhooks.
pub async fn run_callback_loop(
    mut queue: TaskQueue,
    sender: Arc<CallbackSender>,
    cipher: Arc<PayloadCipher>,
    max_attempts: u32,
    retry_delay: Duration,
) -> anyhow::Result<()> {
    tracing::info!(
        queue = QueueNames::SERVICE_CALLBACKS,
        "Service callback consumer started"
    );

    loop {
        let Some(task) = queue.pop(QueueNames::SERVICE_CALLBACKS, POP_TIMEOUT).await? else {
            continue;
        };

        let QueuedTask::ServiceCallback(task) = task else {
            anyhow::bail!("non-callback task routed to the service-callbacks queue");
        };

        let mut scheduler = queue.clone();
        match deliver_service_callback(
            &sender,
            &cipher,
            &mut scheduler,
            task,
            max_attempts,
            retry_delay,
        )
        .await
        {
            Ok(outcome) => {
                tracing::debug!(outcome = ?outcome, "Service callback handled");
            }
            Err(error @ (CallbackDeliveryError::Rejected { .. }
            | CallbackDeliveryError::Exhausted { .. })) => {
                counter!("courier.task.fault", "task" => "deliver-service-callback").increment(1);
                tracing::error!(error = %error, "Service callback delivery failed");
            }
            Err(CallbackDeliveryError::Internal(error)) => return Err(error),
        }
    }
}

/// Move due retry tasks back onto their home queues.
pub async fn run_retry_promoter(mut queue: TaskQueue) -> anyhow::Result<()> {
    tracing::info!(queue = QueueNames::RETRY, "Retry promoter started");

    loop {
        queue.promote_due_retries().await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
