//! Dispatch, supervision and recovery.
//!
//! Every function here runs with the state lock held, except [`supervise`]
//! which owns the await points (executor, timeout, cancellation) and only
//! takes the lock to commit the outcome.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::Inner;
use super::context::ExecutionContext;
use super::record::TaskRecord;
use super::retry::RetryDecision;
use super::state::{QueueState, RetryingTask, RunningTask};
use crate::domain::{QueueEvent, TaskId, TaskInfo, TaskResult, TaskStatus, as_millis};
use crate::error::TaskError;
use crate::executor::Executor;

impl Inner {
    /// Start eligible pending tasks until capacity or eligible work runs out.
    pub(super) fn dispatch_locked(self: &Arc<Self>, st: &mut QueueState) {
        while !st.paused && st.running.len() < st.config.max_concurrent {
            let deps = &st.deps;
            let Some(record) = st.pending.take_first(|r| !deps.has_dependencies(r.id)) else {
                break;
            };
            self.start(st, record);
        }
        self.maybe_arm_idle(st);
    }

    fn start(self: &Arc<Self>, st: &mut QueueState, record: TaskRecord) {
        let Some(executor) = st.executors.get(&record.task_type) else {
            let error = TaskError::NoExecutor(record.task_type.clone());
            warn!(task_id = %record.id, task_type = %record.task_type, "no executor registered");
            self.finish(st, &record, TaskStatus::Failed, None, Some(error), Duration::ZERO);
            return;
        };

        let was_idle = st.running.is_empty();
        let lease = st.next_lease();
        let cancel = CancellationToken::new();
        let info = record.info();
        let ctx = ExecutionContext::new(
            Arc::downgrade(self),
            record.id,
            record.task_type.clone(),
            record.dependencies.clone(),
            lease,
            cancel.clone(),
        );
        let id = record.id;
        let timeout = record.timeout;
        let attempt = record.retry_count + 1;

        if was_idle {
            self.emit(QueueEvent::Busy);
        }
        debug!(task_id = %id, task_type = %record.task_type, attempt, "dispatching");
        self.emit(QueueEvent::Started {
            task_id: id,
            task_type: record.task_type.clone(),
            attempt,
        });

        st.running.insert(
            id,
            RunningTask {
                record,
                lease,
                started_at: Instant::now(),
                started_at_utc: self.clock.now(),
                progress: 0,
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(supervise(
            Arc::clone(self),
            id,
            lease,
            executor,
            info,
            ctx,
            timeout,
            cancel,
        ));
    }

    /// Commit the outcome of attempt `lease`. Stale attempts are dropped.
    fn settle(
        self: &Arc<Self>,
        id: TaskId,
        lease: u64,
        outcome: Result<serde_json::Value, TaskError>,
        elapsed: Duration,
    ) {
        let mut st = self.lock();
        if !st.holds_lease(id, lease) {
            debug!(task_id = %id, lease, "dropping outcome of a superseded attempt");
            return;
        }
        let Some(run) = st.running.remove(&id) else {
            return;
        };

        match outcome {
            Ok(data) => {
                info!(task_id = %id, task_type = %run.record.task_type, elapsed_ms = as_millis(elapsed), "task completed");
                self.finish(&mut st, &run.record, TaskStatus::Completed, Some(data), None, elapsed);
            }
            Err(TaskError::Cancelled) => {
                run.cancel.cancel();
                self.finish(
                    &mut st,
                    &run.record,
                    TaskStatus::Cancelled,
                    None,
                    Some(TaskError::Cancelled),
                    elapsed,
                );
            }
            Err(error) => {
                // Timed out or failed: the executor may still be running detached.
                run.cancel.cancel();
                self.handle_failure(&mut st, run.record, error, elapsed);
            }
        }
        self.dispatch_locked(&mut st);
    }

    fn handle_failure(
        self: &Arc<Self>,
        st: &mut QueueState,
        mut record: TaskRecord,
        error: TaskError,
        elapsed: Duration,
    ) {
        match st
            .retry_policy
            .decide(record.retry_count, record.max_retries, &error)
        {
            RetryDecision::Retry { retry_count, delay } => {
                record.schedule_retry(retry_count);
                st.totals.retried += 1;
                warn!(
                    task_id = %record.id,
                    task_type = %record.task_type,
                    retry_count,
                    max_retries = record.max_retries,
                    delay_ms = as_millis(delay),
                    error = %error,
                    "attempt failed, retrying"
                );
                self.emit(QueueEvent::Retry {
                    task_id: record.id,
                    retry_count,
                    max_retries: record.max_retries,
                    delay_ms: as_millis(delay),
                    error: error.clone(),
                });

                let id = record.id;
                let due_at = Instant::now() + delay;
                st.retrying.insert(
                    id,
                    RetryingTask {
                        record,
                        due_at,
                        last_error: error,
                    },
                );
                let queue = Arc::downgrade(self);
                tokio::spawn(async move {
                    tokio::time::sleep_until(due_at).await;
                    if let Some(inner) = queue.upgrade() {
                        inner.readmit(id);
                    }
                });
            }
            RetryDecision::Fail => {
                warn!(
                    task_id = %record.id,
                    task_type = %record.task_type,
                    retries = record.retry_count,
                    error = %error,
                    "task failed"
                );
                self.finish(st, &record, TaskStatus::Failed, None, Some(error), elapsed);
            }
        }
    }

    /// Move a task whose backoff elapsed back into the pending list.
    fn readmit(self: &Arc<Self>, id: TaskId) {
        let mut st = self.lock();
        let Some(retrying) = st.retrying.remove(&id) else {
            // cancelled, cleared or destroyed meanwhile
            return;
        };
        debug!(task_id = %id, retry_count = retrying.record.retry_count, "re-admitting after backoff");
        let by_priority = st.config.enable_priority;
        st.pending.insert(retrying.record, by_priority);
        self.dispatch_locked(&mut st);
    }

    /// Store the terminal result, update totals and emit the terminal event.
    pub(super) fn finish(
        &self,
        st: &mut QueueState,
        record: &TaskRecord,
        status: TaskStatus,
        data: Option<serde_json::Value>,
        error: Option<TaskError>,
        duration: Duration,
    ) -> TaskResult {
        let result = TaskResult {
            task_id: record.id,
            task_type: record.task_type.clone(),
            status,
            data,
            error,
            duration_ms: as_millis(duration),
            retries: record.retry_count,
            completed_at: self.clock.now(),
        };

        match status {
            TaskStatus::Completed => {
                st.totals.completed += 1;
                let unblocked = st.deps.resolve(record.id);
                if !unblocked.is_empty() {
                    debug!(task_id = %record.id, unblocked = unblocked.len(), "dependents unblocked");
                }
            }
            TaskStatus::Failed => st.totals.failed += 1,
            TaskStatus::Cancelled => st.totals.cancelled += 1,
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Retrying => {}
        }

        for evicted in st.results.insert(result.clone()) {
            debug!(task_id = %evicted, "result evicted");
        }

        let event = match status {
            TaskStatus::Completed => QueueEvent::Completed {
                result: result.clone(),
            },
            TaskStatus::Cancelled => QueueEvent::Cancelled {
                result: result.clone(),
            },
            _ => QueueEvent::Failed {
                result: result.clone(),
            },
        };
        self.emit(event);
        result
    }

    pub(super) fn maybe_arm_idle(self: &Arc<Self>, st: &mut QueueState) {
        if !st.is_idle() {
            if st.idle_timer.is_some() {
                st.disarm_idle();
            }
            return;
        }
        if st.idle_timer.is_some() {
            return;
        }
        let generation = st.idle_generation;
        let idle_timeout = st.config.idle_timeout();
        let queue = Arc::downgrade(self);
        st.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            if let Some(inner) = queue.upgrade() {
                inner.on_idle(generation);
            }
        }));
    }

    fn on_idle(&self, generation: u64) {
        let mut st = self.lock();
        if st.idle_generation != generation || !st.is_idle() {
            return;
        }
        st.idle_timer = None;
        st.idle_generation += 1;
        let window = st.config.dedup_window();
        let swept = st.dedup.sweep_expired(window, Instant::now());
        debug!(swept, "queue idle");
        self.emit(QueueEvent::Idle);
    }
}

/// Run one attempt against its timeout and cancellation token, then commit.
///
/// The executor runs on its own task. On timeout or cancellation that task is
/// detached, not aborted.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    inner: Arc<Inner>,
    id: TaskId,
    lease: u64,
    executor: Arc<dyn Executor>,
    info: TaskInfo,
    ctx: ExecutionContext,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let span = info_span!("task", task_type = %info.task_type, task_id = %id);
    let started = Instant::now();
    let mut handle = tokio::spawn(async move { executor.execute(info, ctx).await }.instrument(span));

    let outcome = tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(e)) => Err(TaskError::from(e)),
            Err(e) => Err(TaskError::Panicked(join_error_message(e))),
        },
        _ = cancel.cancelled() => Err(TaskError::Cancelled),
        _ = tokio::time::sleep(timeout) => {
            warn!(task_id = %id, timeout_ms = as_millis(timeout), "task timed out");
            Err(TaskError::timeout(timeout))
        }
    };
    drop(handle);

    inner.settle(id, lease, outcome, started.elapsed());
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "executor task was aborted".to_string();
    }
    panic_message(err.into_panic())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
