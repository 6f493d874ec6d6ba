//! Retry/failure classification for background tasks.
//!
//! Every id-keyed asynchronous side effect runs under a [`RetryPolicy`]
//! parameterized by two closed sets of error kinds: `retry_on` failures are
//! rescheduled with a delay up to the attempt bound, `fail_on` failures (and
//! retry exhaustion) mark the notification `technical-failure` and raise a
//! fault for operator alerting. Anything outside both sets is a programming
//! defect and propagates unmodified. Tasks never roll their own retry loops.

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use courier_common::queue::{QueueError, TaskScheduler};
use courier_common::types::{NotificationStatus, QueuedTask};

use crate::identity::IdentityError;
use crate::store::StatusStore;

/// Default attempt bound for retryable failures.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before a rescheduled task runs again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Closed enumeration of task failure kinds, used in policy sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskErrorKind {
    Timeout,
    Network,
    UpstreamServerError,
    UpstreamThrottled,
    UpstreamRejected,
    RecordNotFound,
    InvalidRecipient,
    Store,
    IdentityRetryable,
    IdentityNonRetryable,
}

/// A classified failure raised by a wrapped task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("network failure reaching {target}: {detail}")]
    Network { target: String, detail: String },

    #[error("{target} returned server error {status}")]
    UpstreamServerError { target: String, status: u16 },

    #[error("{0} throttled the request")]
    UpstreamThrottled(String),

    #[error("{target} rejected the request: {detail}")]
    UpstreamRejected { target: String, detail: String },

    #[error("{0} not found")]
    RecordNotFound(String),

    #[error("recipient cannot be resolved: {0}")]
    InvalidRecipient(String),

    #[error("store failure: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl TaskError {
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::Timeout(_) => TaskErrorKind::Timeout,
            TaskError::Network { .. } => TaskErrorKind::Network,
            TaskError::UpstreamServerError { .. } => TaskErrorKind::UpstreamServerError,
            TaskError::UpstreamThrottled(_) => TaskErrorKind::UpstreamThrottled,
            TaskError::UpstreamRejected { .. } => TaskErrorKind::UpstreamRejected,
            TaskError::RecordNotFound(_) => TaskErrorKind::RecordNotFound,
            TaskError::InvalidRecipient(_) => TaskErrorKind::InvalidRecipient,
            TaskError::Store(_) => TaskErrorKind::Store,
            TaskError::Identity(IdentityError::Retryable(_)) => TaskErrorKind::IdentityRetryable,
            TaskError::Identity(IdentityError::NonRetryable(_)) => {
                TaskErrorKind::IdentityNonRetryable
            }
        }
    }
}

/// Terminal fault raised when a task exhausts its retries or fails fatally.
/// Expected to reach operational alerting, never to be swallowed.
#[derive(Debug, Error)]
#[error(
    "The task {task} failed for notification {notification_id}. \
     Notification has been updated to technical-failure"
)]
pub struct TechnicalFailureFault {
    pub task: &'static str,
    pub notification_id: Uuid,
    #[source]
    pub source: TaskError,
}

/// How a policy-wrapped run ended.
#[derive(Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retried,
}

#[derive(Debug, Error)]
pub enum TaskRunError {
    #[error(transparent)]
    Fault(#[from] TechnicalFailureFault),

    /// A failure outside both policy sets — a bug, not an operational
    /// condition. Propagates unmodified.
    #[error(transparent)]
    Unclassified(TaskError),

    #[error("failed to reschedule {task}: {source}")]
    Reschedule {
        task: &'static str,
        source: QueueError,
    },
}

/// Marks notifications as technically failed. A trait so the policy runner
/// can be exercised with a fake store.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn mark_technical_failure(&self, notification_id: Uuid) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl StatusWriter for PgPool {
    async fn mark_technical_failure(&self, notification_id: Uuid) -> Result<(), sqlx::Error> {
        StatusStore::update_status_by_id(self, notification_id, NotificationStatus::TechnicalFailure)
            .await
            .map(|_| ())
    }
}

/// Retry/failure classification policy applied to a task at registration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_on: Vec<TaskErrorKind>,
    pub fail_on: Vec<TaskErrorKind>,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_on: vec![
                TaskErrorKind::Timeout,
                TaskErrorKind::Network,
                TaskErrorKind::UpstreamServerError,
                TaskErrorKind::UpstreamThrottled,
                TaskErrorKind::Store,
                TaskErrorKind::IdentityRetryable,
            ],
            fail_on: vec![
                TaskErrorKind::UpstreamRejected,
                TaskErrorKind::RecordNotFound,
                TaskErrorKind::InvalidRecipient,
                TaskErrorKind::IdentityNonRetryable,
            ],
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Run one attempt of a wrapped task.
    ///
    /// `attempt` is the zero-based attempt index carried by the queue
    /// message; `retry_task` is the message to park on the retry queue if
    /// this attempt fails retryably (the caller builds it with the
    /// incremented counter).
    pub async fn run<F, Fut>(
        &self,
        store: &dyn StatusWriter,
        scheduler: &mut dyn TaskScheduler,
        task_name: &'static str,
        notification_id: Uuid,
        attempt: u32,
        retry_task: QueuedTask,
        work: F,
    ) -> Result<TaskOutcome, TaskRunError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let Err(error) = work().await else {
            return Ok(TaskOutcome::Completed);
        };

        let kind = error.kind();
        let retryable = self.retry_on.contains(&kind);

        if retryable && attempt < self.max_attempts {
            scheduler
                .enqueue_retry(&retry_task, self.retry_delay)
                .await
                .map_err(|source| TaskRunError::Reschedule {
                    task: task_name,
                    source,
                })?;
            counter!("courier.task.retried", "task" => task_name).increment(1);
            tracing::warn!(
                task = task_name,
                notification_id = %notification_id,
                attempt,
                error = %error,
                "Task failed, rescheduled on retry queue"
            );
            return Ok(TaskOutcome::Retried);
        }

        // Exhausted retries convert into the fail_on path rather than
        // retrying indefinitely.
        if retryable || self.fail_on.contains(&kind) {
            if let Err(store_error) = store.mark_technical_failure(notification_id).await {
                tracing::error!(
                    task = task_name,
                    notification_id = %notification_id,
                    error = %store_error,
                    "Could not mark notification technical-failure"
                );
            }
            counter!("courier.task.failed", "task" => task_name).increment(1);
            return Err(TaskRunError::Fault(TechnicalFailureFault {
                task: task_name,
                notification_id,
                source: error,
            }));
        }

        Err(TaskRunError::Unclassified(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use courier_common::types::{ContactLookupTask, QueuedTask};

    #[derive(Default)]
    struct FakeWriter {
        marked: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl StatusWriter for FakeWriter {
        async fn mark_technical_failure(&self, notification_id: Uuid) -> Result<(), sqlx::Error> {
            self.marked.lock().unwrap().push(notification_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        retried: Vec<QueuedTask>,
    }

    #[async_trait]
    impl TaskScheduler for RecordingScheduler {
        async fn enqueue(&mut self, _queue: &str, _task: &QueuedTask) -> Result<(), QueueError> {
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

    fn make_retry_task(notification_id: Uuid, attempt: u32) -> QueuedTask {
        QueuedTask::ContactLookup(ContactLookupTask {
            notification_id,
            attempt,
        })
    }

    fn retryable_error() -> TaskError {
        TaskError::Timeout("contact-profile".to_string())
    }

    fn fatal_error() -> TaskError {
        TaskError::RecordNotFound("notification".to_string())
    }

    #[tokio::test]
    async fn test_successful_work_completes() {
        let policy = RetryPolicy::default();
        let writer = FakeWriter::default();
        let mut scheduler = RecordingScheduler::default();
        let id = Uuid::new_v4();

        let outcome = policy
            .run(&writer, &mut scheduler, "test-task", id, 0, make_retry_task(id, 1), || async {
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome, TaskOutcome::Completed);
        assert!(scheduler.retried.is_empty());
        assert!(writer.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retryable_failure_retried_exactly_max_attempts_then_fails() {
        let policy = RetryPolicy::default();
        let writer = FakeWriter::default();
        let mut scheduler = RecordingScheduler::default();
        let id = Uuid::new_v4();

        // Attempts 0..max reschedule; the attempt at the bound escalates.
        for attempt in 0..policy.max_attempts {
            let outcome = policy
                .run(
                    &writer,
                    &mut scheduler,
                    "test-task",
                    id,
                    attempt,
                    make_retry_task(id, attempt + 1),
                    || async { Err(retryable_error()) },
                )
                .await
                .unwrap();
            assert_eq!(outcome, TaskOutcome::Retried);
        }
        assert_eq!(scheduler.retried.len(), policy.max_attempts as usize);
        assert!(writer.marked.lock().unwrap().is_empty());

        let err = policy
            .run(
                &writer,
                &mut scheduler,
                "test-task",
                id,
                policy.max_attempts,
                make_retry_task(id, policy.max_attempts + 1),
                || async { Err(retryable_error()) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TaskRunError::Fault(_)));
        assert_eq!(scheduler.retried.len(), policy.max_attempts as usize);
        assert_eq!(writer.marked.lock().unwrap().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_fatal_failure_raises_immediately_without_retry() {
        let policy = RetryPolicy::default();
        let writer = FakeWriter::default();
        let mut scheduler = RecordingScheduler::default();
        let id = Uuid::new_v4();

        let err = policy
            .run(&writer, &mut scheduler, "test-task", id, 0, make_retry_task(id, 1), || async {
                Err(fatal_error())
            })
            .await
            .unwrap_err();

        let TaskRunError::Fault(fault) = err else {
            panic!("expected fault");
        };
        assert_eq!(fault.notification_id, id);
        assert_eq!(fault.task, "test-task");
        assert!(scheduler.retried.is_empty());
        assert_eq!(writer.marked.lock().unwrap().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_unclassified_failure_propagates_unmodified() {
        // A policy that classifies nothing: every failure is a defect.
        let policy = RetryPolicy {
            retry_on: vec![],
            fail_on: vec![],
            ..RetryPolicy::default()
        };
        let writer = FakeWriter::default();
        let mut scheduler = RecordingScheduler::default();
        let id = Uuid::new_v4();

        let err = policy
            .run(&writer, &mut scheduler, "test-task", id, 0, make_retry_task(id, 1), || async {
                Err(retryable_error())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TaskRunError::Unclassified(_)));
        assert!(scheduler.retried.is_empty());
        assert!(writer.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_errors_classify_by_kind() {
        assert_eq!(
            TaskError::Identity(IdentityError::Retryable("timeout".into())).kind(),
            TaskErrorKind::IdentityRetryable
        );
        assert_eq!(
            TaskError::Identity(IdentityError::NonRetryable("deceased".into())).kind(),
            TaskErrorKind::IdentityNonRetryable
        );
    }
}
