use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskStatus, TaskType};
use crate::error::TaskError;

/// Terminal record of a task, kept in the bounded result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub task_type: TaskType,
    /// COMPLETED, FAILED or CANCELLED.
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Wall time of the last attempt; zero when the task never ran.
    pub duration_ms: u64,
    pub retries: u32,
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    fn result(status: TaskStatus, error: Option<TaskError>) -> TaskResult {
        TaskResult {
            task_id: TaskId::from(Ulid::new()),
            task_type: TaskType::new("ai.request"),
            status,
            data: None,
            error,
            duration_ms: 12,
            retries: 0,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn only_completed_is_success() {
        assert!(result(TaskStatus::Completed, None).success());
        assert!(!result(TaskStatus::Failed, Some(TaskError::Timeout(5))).success());
        assert!(!result(TaskStatus::Cancelled, Some(TaskError::Cancelled)).success());
    }

    #[test]
    fn serializes_error_only_when_present() {
        let mut ok = result(TaskStatus::Completed, None);
        ok.data = Some(json!({ "answer": 42 }));
        let value = serde_json::to_value(&ok).unwrap();

        assert_eq!(value["status"], "COMPLETED");
        assert_eq!(value["data"]["answer"], 42);
        assert!(value.get("error").is_none());

        let back: TaskResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, ok);
    }
}
