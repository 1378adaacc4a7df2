//! Task status - タスクの状態
//!
//! # 状態遷移
//! - Pending -> Running -> Completed
//! - Pending -> Running -> Retrying -> Pending (max_retries まで)
//! - Pending -> Running -> Failed (リトライ不可 or 上限到達)
//! - Pending | Running | Retrying -> Cancelled

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting in the pending list (possibly blocked on dependencies).
    Pending,

    /// Handed to an executor.
    Running,

    /// Failed an attempt; sleeping through the backoff before re-admission.
    Retrying,

    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses only ever appear on a stored `TaskResult`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Retrying => "RETRYING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
