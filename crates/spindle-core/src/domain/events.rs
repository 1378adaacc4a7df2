//! Events - キューで発生したイベント
//!
//! `TaskQueue::subscribe()` の broadcast チャネルで配送される。
//! 終端イベント（Completed / Failed / Cancelled）は `TaskResult` をそのまま運ぶ。

use serde::Serialize;

use super::{Priority, TaskId, TaskResult, TaskType};
use crate::error::TaskError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued {
        task_id: TaskId,
        task_type: TaskType,
        priority: Priority,
    },
    /// Admission suppressed by a live dedup entry.
    Deduped {
        dedup_key: String,
        existing: TaskId,
        task_type: TaskType,
    },
    Started {
        task_id: TaskId,
        task_type: TaskType,
        attempt: u32,
    },
    Progress {
        task_id: TaskId,
        progress: u8,
    },
    Completed {
        result: TaskResult,
    },
    Failed {
        result: TaskResult,
    },
    Retry {
        task_id: TaskId,
        retry_count: u32,
        max_retries: u32,
        delay_ms: u64,
        error: TaskError,
    },
    Cancelled {
        result: TaskResult,
    },
    /// Nothing pending, running or waiting for retry for `idle_timeout`.
    Idle,
    /// First task started while nothing was running.
    Busy,
    Paused,
    Resumed,
    Cleared {
        removed: usize,
    },
    ConfigUpdated,
}

impl QueueEvent {
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            QueueEvent::Enqueued { task_id, .. }
            | QueueEvent::Started { task_id, .. }
            | QueueEvent::Progress { task_id, .. }
            | QueueEvent::Retry { task_id, .. } => Some(*task_id),
            QueueEvent::Deduped { existing, .. } => Some(*existing),
            QueueEvent::Completed { result }
            | QueueEvent::Failed { result }
            | QueueEvent::Cancelled { result } => Some(result.task_id),
            QueueEvent::Idle
            | QueueEvent::Busy
            | QueueEvent::Paused
            | QueueEvent::Resumed
            | QueueEvent::Cleared { .. }
            | QueueEvent::ConfigUpdated => None,
        }
    }

    /// The result carried by a terminal event.
    pub fn terminal_result(&self) -> Option<&TaskResult> {
        match self {
            QueueEvent::Completed { result }
            | QueueEvent::Failed { result }
            | QueueEvent::Cancelled { result } => Some(result),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Enqueued { .. } => "enqueued",
            QueueEvent::Deduped { .. } => "deduped",
            QueueEvent::Started { .. } => "started",
            QueueEvent::Progress { .. } => "progress",
            QueueEvent::Completed { .. } => "completed",
            QueueEvent::Failed { .. } => "failed",
            QueueEvent::Retry { .. } => "retry",
            QueueEvent::Cancelled { .. } => "cancelled",
            QueueEvent::Idle => "idle",
            QueueEvent::Busy => "busy",
            QueueEvent::Paused => "paused",
            QueueEvent::Resumed => "resumed",
            QueueEvent::Cleared { .. } => "cleared",
            QueueEvent::ConfigUpdated => "config_updated",
        }
    }
}
