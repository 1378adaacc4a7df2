//! Status views returned by `TaskQueue::status()` and tag queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::record::TaskRecord;
use super::state::{QueueState, RetryingTask, RunningTask};
use crate::domain::{Priority, TaskId, TaskStatus, TaskType, as_millis};
use crate::error::TaskError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    /// Results currently held in the result store.
    pub stored_results: usize,

    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retried: u64,
    pub deduped: u64,
}

/// Point-in-time copy of one live task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub tags: Vec<String>,
    /// Dependencies without a successful result yet. Pending tasks only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waiting_on: Vec<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    /// Error of the attempt that scheduled the pending retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<TaskError>,
}

impl TaskSnapshot {
    fn base(record: &TaskRecord, status: TaskStatus) -> Self {
        Self {
            id: record.id,
            task_type: record.task_type.clone(),
            status,
            priority: record.priority,
            created_at: record.created_at,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
            tags: record.tags.clone(),
            waiting_on: Vec::new(),
            progress: None,
            started_at: None,
            retry_in_ms: None,
            last_error: None,
        }
    }

    pub(crate) fn pending(record: &TaskRecord, waiting_on: Vec<TaskId>) -> Self {
        Self {
            waiting_on,
            ..Self::base(record, TaskStatus::Pending)
        }
    }

    pub(crate) fn running(task: &RunningTask) -> Self {
        Self {
            progress: Some(task.progress),
            started_at: Some(task.started_at_utc),
            ..Self::base(&task.record, TaskStatus::Running)
        }
    }

    pub(crate) fn retrying(task: &RetryingTask, now: Instant) -> Self {
        Self {
            retry_in_ms: Some(as_millis(task.due_at.saturating_duration_since(now))),
            last_error: Some(task.last_error.clone()),
            ..Self::base(&task.record, TaskStatus::Retrying)
        }
    }
}

/// Deep snapshot of the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub paused: bool,
    pub max_concurrent: usize,
    pub counts: QueueCounts,
    /// In dispatch order.
    pub pending: Vec<TaskSnapshot>,
    /// In start order.
    pub running: Vec<TaskSnapshot>,
    /// Soonest retry first.
    pub retrying: Vec<TaskSnapshot>,
}

impl QueueStatus {
    pub(crate) fn capture(st: &QueueState, now: Instant) -> Self {
        let pending = st
            .pending
            .iter()
            .map(|r| TaskSnapshot::pending(r, st.deps.get_dependencies(r.id)))
            .collect();

        let mut running: Vec<&RunningTask> = st.running.values().collect();
        running.sort_by_key(|r| r.lease);

        let mut retrying: Vec<&RetryingTask> = st.retrying.values().collect();
        retrying.sort_by_key(|r| (r.due_at, r.record.id));

        Self {
            paused: st.paused,
            max_concurrent: st.config.max_concurrent,
            counts: QueueCounts {
                pending: st.pending.len(),
                running: st.running.len(),
                retrying: st.retrying.len(),
                stored_results: st.results.len(),
                ..st.totals.clone()
            },
            pending,
            running: running.into_iter().map(TaskSnapshot::running).collect(),
            retrying: retrying
                .into_iter()
                .map(|r| TaskSnapshot::retrying(r, now))
                .collect(),
        }
    }

    pub fn find(&self, id: TaskId) -> Option<&TaskSnapshot> {
        self.pending
            .iter()
            .chain(&self.running)
            .chain(&self.retrying)
            .find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::domain::{Priority, TaskStatus};
    use crate::queue::record::tests::record;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn capture_orders_and_counts() {
        let mut st = QueueState::new(QueueConfig::default());
        let dep = record(Priority::Normal);
        let blocked = record(Priority::High);
        st.deps.add_dependency(blocked.id, dep.id);
        st.pending.insert(blocked.clone(), true);

        let now = Instant::now();
        let run = record(Priority::Low);
        st.running.insert(
            run.id,
            RunningTask {
                record: run.clone(),
                lease: 1,
                started_at: now,
                started_at_utc: Utc::now(),
                progress: 40,
                cancel: CancellationToken::new(),
            },
        );
        let retry = record(Priority::Normal);
        st.retrying.insert(
            retry.id,
            RetryingTask {
                record: retry.clone(),
                due_at: now + Duration::from_millis(300),
                last_error: crate::error::TaskError::Timeout(10),
            },
        );
        st.totals.completed = 7;

        let status = QueueStatus::capture(&st, now);

        assert_eq!(status.counts.pending, 1);
        assert_eq!(status.counts.running, 1);
        assert_eq!(status.counts.retrying, 1);
        assert_eq!(status.counts.completed, 7);
        assert_eq!(status.pending[0].waiting_on, vec![dep.id]);
        assert_eq!(status.running[0].progress, Some(40));
        assert_eq!(status.retrying[0].retry_in_ms, Some(300));
        assert_eq!(
            status.retrying[0].last_error,
            Some(crate::error::TaskError::Timeout(10))
        );
        assert_eq!(status.find(retry.id).unwrap().status, TaskStatus::Retrying);
        assert!(status.find(dep.id).is_none());
    }
}
