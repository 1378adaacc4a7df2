use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{TaskId, TaskType};

/// Invalid or unreadable queue configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid queue config: {0}")]
    Invalid(String),

    #[error("failed to parse queue config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read queue config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by an executor for one attempt.
///
/// `Failed` and `Payload` differ in retry treatment: a payload that does not
/// decode will not decode on the next attempt either.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),

    #[error("payload decode: {0}")]
    Payload(#[from] serde_json::Error),

    /// The executor observed its cancellation token and gave up.
    #[error("cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<String> for ExecutorError {
    fn from(msg: String) -> Self {
        Self::Failed(msg)
    }
}

impl From<&str> for ExecutorError {
    fn from(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

/// Why a task ended up FAILED or CANCELLED. Stored on the `TaskResult`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskError {
    #[error("no executor registered for task type '{0}'")]
    NoExecutor(TaskType),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Executor(String),

    #[error("executor panicked: {0}")]
    Panicked(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl TaskError {
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout(crate::domain::as_millis(after))
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Timeout(_) | TaskError::Executor(_) | TaskError::Panicked(_)
        )
    }
}

impl From<ExecutorError> for TaskError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Failed(msg) => TaskError::Executor(msg),
            ExecutorError::Payload(e) => TaskError::InvalidPayload(e.to_string()),
            ExecutorError::Cancelled => TaskError::Cancelled,
        }
    }
}

/// Failure of [`TaskQueue::wait_for_task`](crate::queue::TaskQueue::wait_for_task).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out after {waited:?} waiting for {task_id}")]
    Timeout { task_id: TaskId, waited: Duration },

    /// The queue was destroyed while waiting.
    #[error("queue closed while waiting for {0}")]
    Closed(TaskId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskError::NoExecutor(TaskType::new("x")), false)]
    #[case(TaskError::Timeout(10), true)]
    #[case(TaskError::Cancelled, false)]
    #[case(TaskError::Executor("boom".into()), true)]
    #[case(TaskError::Panicked("boom".into()), true)]
    #[case(TaskError::InvalidPayload("missing field".into()), false)]
    fn retryable_kinds(#[case] err: TaskError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn executor_errors_map_to_task_errors() {
        let decode = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        assert!(matches!(
            TaskError::from(ExecutorError::from(decode)),
            TaskError::InvalidPayload(_)
        ));
        assert_eq!(
            TaskError::from(ExecutorError::from("nope")),
            TaskError::Executor("nope".into())
        );
        assert_eq!(TaskError::from(ExecutorError::Cancelled), TaskError::Cancelled);
    }

    #[test]
    fn task_error_serializes_tagged() {
        let json = serde_json::to_value(TaskError::Timeout(250)).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "timeout", "detail": 250 }));

        let json = serde_json::to_value(TaskError::Cancelled).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "cancelled" }));
    }

    #[test]
    fn no_executor_message_names_type() {
        let msg = TaskError::NoExecutor(TaskType::new("gui.action")).to_string();
        assert!(msg.contains("no executor registered"));
        assert!(msg.contains("gui.action"));
    }
}
