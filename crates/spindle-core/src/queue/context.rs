//! Execution context handed to executors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Weak;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::Inner;
use crate::domain::{QueueEvent, TaskId, TaskResult, TaskType};

/// Per-attempt handle for reporting progress, observing cancellation,
/// logging and reading dependency results.
///
/// Holds only a weak reference to the queue: once the queue is dropped,
/// progress reports and lookups become no-ops.
#[derive(Clone)]
pub struct ExecutionContext {
    queue: Weak<Inner>,
    task_id: TaskId,
    task_type: TaskType,
    dependencies: Vec<TaskId>,
    lease: u64,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub(crate) fn new(
        queue: Weak<Inner>,
        task_id: TaskId,
        task_type: TaskType,
        dependencies: Vec<TaskId>,
        lease: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            task_id,
            task_type,
            dependencies,
            lease,
            cancel,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Update progress (clamped to 100) and emit `Progress`.
    ///
    /// Ignored once this attempt is no longer running.
    pub fn report_progress(&self, percent: u32) {
        let Some(inner) = self.queue.upgrade() else {
            return;
        };
        let progress = u8::try_from(percent.min(100)).unwrap_or(100);
        let mut st = inner.lock();
        let Some(run) = st
            .running
            .get_mut(&self.task_id)
            .filter(|r| r.lease == self.lease)
        else {
            return;
        };
        run.progress = progress;
        inner.emit(QueueEvent::Progress {
            task_id: self.task_id,
            progress,
        });
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task is cancelled or times out.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn dependency_result(&self, id: TaskId) -> Option<TaskResult> {
        let inner = self.queue.upgrade()?;
        let st = inner.lock();
        st.results.get(id).cloned()
    }

    /// Stored results of this task's dependencies. Results already evicted
    /// from the store are missing from the map.
    pub fn dependency_results(&self) -> HashMap<TaskId, TaskResult> {
        let Some(inner) = self.queue.upgrade() else {
            return HashMap::new();
        };
        let st = inner.lock();
        self.dependencies
            .iter()
            .filter_map(|id| st.results.get(*id).map(|r| (*id, r.clone())))
            .collect()
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        tracing::debug!(task_type = %self.task_type, task_id = %self.task_id, "{msg}");
    }

    pub fn info(&self, msg: impl fmt::Display) {
        tracing::info!(task_type = %self.task_type, task_id = %self.task_id, "{msg}");
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        tracing::warn!(task_type = %self.task_type, task_id = %self.task_id, "{msg}");
    }

    pub fn error(&self, msg: impl fmt::Display) {
        tracing::error!(task_type = %self.task_type, task_id = %self.task_id, "{msg}");
    }

    #[cfg(test)]
    pub(crate) fn detached(task_id: TaskId, task_type: TaskType) -> Self {
        Self::new(
            Weak::new(),
            task_id,
            task_type,
            Vec::new(),
            0,
            CancellationToken::new(),
        )
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("task_type", &self.task_type)
            .field("lease", &self.lease)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

