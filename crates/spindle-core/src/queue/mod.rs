//! The task queue: admission, dispatch, supervision and recovery.
//!
//! Design:
//! - One `std::sync::Mutex` around all bookkeeping. It is never held across
//!   an `.await`; the await points live in spawned supervisor, retry and idle
//!   tasks.
//! - Events are sent while the state lock is held, so subscribers observe
//!   them in commit order.
//! - `TaskQueue` is a cheap clonable handle. Spawned tasks hold only weak
//!   references, except a running supervisor which keeps the queue alive
//!   until its attempt settles.

mod context;
mod dedup;
mod dependency;
mod pending;
mod record;
mod results;
mod retry;
mod state;
mod status;
mod supervisor;

pub use context::ExecutionContext;
pub use dedup::DedupTable;
pub use dependency::DependencyGraph;
pub use pending::PendingList;
pub use record::TaskRecord;
pub use results::ResultStore;
pub use retry::{RetryDecision, RetryPolicy};
pub use status::{QueueCounts, QueueStatus, TaskSnapshot};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use self::state::QueueState;
use crate::config::QueueConfig;
use crate::domain::{QueueEvent, TaskId, TaskOptions, TaskResult, TaskStatus, TaskType};
use crate::error::{ConfigError, TaskError, WaitError};
use crate::executor::Executor;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

pub(crate) struct Inner {
    state: Mutex<QueueState>,
    events: Mutex<broadcast::Sender<QueueEvent>>,
    clock: Arc<dyn Clock>,
    ids: UlidGenerator<Arc<dyn Clock>>,
}

impl Inner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> MutexGuard<'_, broadcast::Sender<QueueEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send to current subscribers. Having none is not an error.
    pub(crate) fn emit(&self, event: QueueEvent) {
        let _ = self.sender().send(event);
    }
}

/// Priority task scheduler.
///
/// # 使用例
/// ```ignore
/// let queue = TaskQueue::new(QueueConfig::default())?;
/// queue.register_executor("ai.request", executor_fn(|task, ctx| async move {
///     ctx.report_progress(50);
///     Ok(task.data)
/// }));
///
/// let id = queue.enqueue("ai.request", json!({ "prompt": "hi" }), TaskOptions::new());
/// ```
///
/// Operations that may start work (`enqueue`, `cancel`, `resume`, ...) spawn
/// onto the current Tokio runtime and panic outside of one.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a queue whose wall-clock timestamps and id timestamps come from `clock`.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new(config)),
                events: Mutex::new(tx),
                ids: UlidGenerator::new(Arc::clone(&clock)),
                clock,
            }),
        })
    }

    /// Register the executor for `task_type`, replacing any previous one.
    pub fn register_executor<E>(&self, task_type: impl Into<TaskType>, executor: E)
    where
        E: Executor + 'static,
    {
        self.register_executor_arc(task_type.into(), Arc::new(executor));
    }

    pub fn register_executor_arc(&self, task_type: TaskType, executor: Arc<dyn Executor>) {
        let mut st = self.inner.lock();
        if st.executors.register(task_type.clone(), executor).is_some() {
            debug!(task_type = %task_type, "executor replaced");
        } else {
            debug!(task_type = %task_type, "executor registered");
        }
    }

    pub fn has_executor(&self, task_type: &TaskType) -> bool {
        self.inner.lock().executors.contains(task_type)
    }

    /// Admit a task.
    ///
    /// Returns `None` when a live dedup entry exists for `options.dedup_key`.
    /// Never runs the executor inline.
    pub fn enqueue(
        &self,
        task_type: impl Into<TaskType>,
        data: serde_json::Value,
        options: TaskOptions,
    ) -> Option<TaskId> {
        let task_type = task_type.into();
        let inner = &self.inner;
        let mut st = inner.lock();
        let now = Instant::now();

        if st.config.enable_dedup
            && let Some(key) = options.dedup_key.as_deref()
            && let Some(existing) = st.dedup.live(key, st.config.dedup_window(), now)
        {
            debug!(dedup_key = key, existing = %existing, task_type = %task_type, "duplicate suppressed");
            st.totals.deduped += 1;
            inner.emit(QueueEvent::Deduped {
                dedup_key: key.to_string(),
                existing,
                task_type,
            });
            return None;
        }

        let id = inner.ids.generate_task_id();
        let record = TaskRecord::new(
            id,
            task_type,
            data,
            options,
            &st.config,
            inner.clock.now(),
        );

        for dep in &record.dependencies {
            if !st.results.is_success(*dep) {
                st.deps.add_dependency(id, *dep);
            }
        }
        if st.config.enable_dedup
            && let Some(key) = record.dedup_key.clone()
        {
            st.dedup.record(key, id, now);
        }

        st.totals.enqueued += 1;
        info!(task_id = %id, task_type = %record.task_type, priority = %record.priority, "task enqueued");
        inner.emit(QueueEvent::Enqueued {
            task_id: id,
            task_type: record.task_type.clone(),
            priority: record.priority,
        });

        let by_priority = st.config.enable_priority;
        st.pending.insert(record, by_priority);
        st.disarm_idle();
        inner.dispatch_locked(&mut st);
        Some(id)
    }

    /// Cancel a pending, retrying or running task.
    ///
    /// Returns `false` for unknown or already terminal ids. Dependents of the
    /// cancelled task are not cancelled; they stay blocked.
    pub fn cancel(&self, id: TaskId) -> bool {
        let inner = &self.inner;
        let mut st = inner.lock();

        let (record, ran_for) = if let Some(record) = st.pending.remove(id) {
            st.deps.remove_task(id);
            (record, Duration::ZERO)
        } else if let Some(retrying) = st.retrying.remove(&id) {
            (retrying.record, Duration::ZERO)
        } else if let Some(running) = st.running.remove(&id) {
            running.cancel.cancel();
            (running.record, running.started_at.elapsed())
        } else {
            return false;
        };

        info!(task_id = %id, task_type = %record.task_type, "task cancelled");
        inner.finish(
            &mut st,
            &record,
            TaskStatus::Cancelled,
            None,
            Some(TaskError::Cancelled),
            ran_for,
        );
        inner.dispatch_locked(&mut st);
        true
    }

    /// Cancel every live task carrying `tag`. Returns how many were cancelled.
    pub fn cancel_by_tag(&self, tag: &str) -> usize {
        self.tasks_with_tag(tag)
            .into_iter()
            .filter(|snapshot| self.cancel(snapshot.id))
            .count()
    }

    /// Snapshots of live tasks (pending, running or retrying) carrying `tag`.
    pub fn tasks_with_tag(&self, tag: &str) -> Vec<TaskSnapshot> {
        let status = self.status();
        status
            .pending
            .into_iter()
            .chain(status.running)
            .chain(status.retrying)
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Stop dispatching. Running tasks continue.
    pub fn pause(&self) {
        let mut st = self.inner.lock();
        if st.paused {
            return;
        }
        st.paused = true;
        info!("queue paused");
        self.inner.emit(QueueEvent::Paused);
    }

    pub fn resume(&self) {
        let mut st = self.inner.lock();
        if !st.paused {
            return;
        }
        st.paused = false;
        info!("queue resumed");
        self.inner.emit(QueueEvent::Resumed);
        self.inner.dispatch_locked(&mut st);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Drop every pending task and the dedup table. Running and retrying
    /// tasks are untouched. Returns how many pending tasks were removed.
    pub fn clear(&self) -> usize {
        let inner = &self.inner;
        let mut st = inner.lock();
        let removed = st.pending.drain();
        for record in &removed {
            st.deps.remove_task(record.id);
        }
        st.dedup.clear();
        info!(removed = removed.len(), "pending tasks cleared");
        inner.emit(QueueEvent::Cleared {
            removed: removed.len(),
        });
        inner.maybe_arm_idle(&mut st);
        removed.len()
    }

    /// Cancel running tasks, drop all state and registered executors, and
    /// close every event subscription.
    ///
    /// The handle stays usable: executors can be registered again and new
    /// subscriptions receive events from then on.
    pub fn destroy(&self) {
        let inner = &self.inner;
        let mut st = inner.lock();

        let mut running: Vec<_> = st.running.drain().map(|(_, r)| r).collect();
        running.sort_by_key(|r| r.lease);
        for run in running {
            run.cancel.cancel();
            inner.finish(
                &mut st,
                &run.record,
                TaskStatus::Cancelled,
                None,
                Some(TaskError::Cancelled),
                run.started_at.elapsed(),
            );
        }
        st.reset();

        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        *inner.sender() = tx;
        info!("queue destroyed");
    }

    pub fn status(&self) -> QueueStatus {
        let st = self.inner.lock();
        QueueStatus::capture(&st, Instant::now())
    }

    pub fn result(&self, id: TaskId) -> Option<TaskResult> {
        self.inner.lock().results.get(id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.sender().subscribe()
    }

    /// Wait until `id` has a terminal result, up to `timeout` if given.
    ///
    /// Returns the result whatever its status. Errors only on timeout or when
    /// the queue is destroyed while waiting.
    pub async fn wait_for_task(
        &self,
        id: TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskResult, WaitError> {
        // Subscribe before checking the store so a result committed in
        // between is still seen as an event.
        let mut rx = self.subscribe();
        if let Some(result) = self.result(id) {
            return Ok(result);
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(result) = event.terminal_result()
                            && result.task_id == id
                        {
                            return Ok(result.clone());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(task_id = %id, skipped, "waiter lagged, rechecking results");
                        if let Some(result) = self.result(id) {
                            return Ok(result);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(WaitError::Closed(id)),
                }
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .unwrap_or(Err(WaitError::Timeout {
                    task_id: id,
                    waited: limit,
                })),
            None => wait.await,
        }
    }

    /// Replace the whole configuration.
    ///
    /// Applies to admissions and dispatches from now on; tasks already
    /// admitted keep their timeout and retry budget.
    pub fn update_config(&self, config: QueueConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let inner = &self.inner;
        let mut st = inner.lock();
        st.retry_policy = RetryPolicy::from_config(&config);
        for evicted in st.results.set_capacity(config.max_results) {
            debug!(task_id = %evicted, "result evicted");
        }
        st.config = config;
        info!(max_concurrent = st.config.max_concurrent, "queue config updated");
        inner.emit(QueueEvent::ConfigUpdated);
        inner.dispatch_locked(&mut st);
        Ok(())
    }

    pub fn config(&self) -> QueueConfig {
        self.inner.lock().config.clone()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.lock();
        f.debug_struct("TaskQueue")
            .field("pending", &st.pending.len())
            .field("running", &st.running.len())
            .field("retrying", &st.retrying.len())
            .field("paused", &st.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::error::ExecutorError;
    use crate::executor::executor_fn;
    use serde_json::json;

    fn queue(config: QueueConfig) -> TaskQueue {
        TaskQueue::new(config).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = TaskQueue::new(QueueConfig::default().with_max_concurrent(0)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_while_paused_keeps_priority_order() {
        let q = queue(QueueConfig::default());
        q.pause();
        let low = q.enqueue("t", json!(1), TaskOptions::new().with_priority(Priority::Low)).unwrap();
        let crit = q
            .enqueue("t", json!(2), TaskOptions::new().with_priority(Priority::Critical))
            .unwrap();

        let status = q.status();
        let order: Vec<TaskId> = status.pending.iter().map(|s| s.id).collect();
        assert_eq!(order, vec![crit, low]);
        assert!(status.paused);
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_suppresses_and_counts() {
        let q = queue(QueueConfig::default());
        q.pause();
        let first = q.enqueue("t", json!(null), TaskOptions::new().with_dedup_key("k"));
        let second = q.enqueue("t", json!(null), TaskOptions::new().with_dedup_key("k"));

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(q.status().counts.deduped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dedup_disabled_admits_duplicates() {
        let q = queue(QueueConfig::default().with_dedup(false, Duration::from_secs(5)));
        q.pause();
        assert!(q.enqueue("t", json!(null), TaskOptions::new().with_dedup_key("k")).is_some());
        assert!(q.enqueue("t", json!(null), TaskOptions::new().with_dedup_key("k")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn completes_and_stores_result() {
        let q = queue(QueueConfig::default());
        q.register_executor(
            "echo",
            executor_fn(|task, _ctx| async move { Ok::<_, ExecutorError>(task.data) }),
        );

        let id = q.enqueue("echo", json!({ "x": 1 }), TaskOptions::new()).unwrap();
        let result = q.wait_for_task(id, None).await.unwrap();

        assert!(result.success());
        assert_eq!(result.data, Some(json!({ "x": 1 })));
        assert_eq!(q.result(id), Some(result));
        assert_eq!(q.status().counts.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_returns_false() {
        let q = queue(QueueConfig::default());
        let ghost = q.inner.ids.generate_task_id();
        assert!(!q.cancel(ghost));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_are_idempotent() {
        let q = queue(QueueConfig::default());
        let mut rx = q.subscribe();

        q.pause();
        q.pause();
        q.resume();
        q.resume();

        assert_eq!(rx.try_recv().unwrap(), QueueEvent::Paused);
        assert_eq!(rx.try_recv().unwrap(), QueueEvent::Resumed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tag_queries_and_cancellation() {
        let q = queue(QueueConfig::default());
        q.pause();
        let a = q.enqueue("t", json!(null), TaskOptions::new().with_tag("vision")).unwrap();
        let _b = q.enqueue("t", json!(null), TaskOptions::new().with_tag("audio")).unwrap();
        let c = q
            .enqueue("t", json!(null), TaskOptions::new().with_tag("vision").with_tag("fast"))
            .unwrap();

        let tagged: Vec<TaskId> = q.tasks_with_tag("vision").iter().map(|s| s.id).collect();
        assert_eq!(tagged, vec![a, c]);

        assert_eq!(q.cancel_by_tag("vision"), 2);
        assert_eq!(q.status().counts.pending, 1);
        assert_eq!(q.result(a).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn update_config_rejects_invalid_and_applies_valid() {
        let q = queue(QueueConfig::default());
        assert!(q.update_config(QueueConfig::default().with_max_results(0)).is_err());

        let mut rx = q.subscribe();
        q.update_config(QueueConfig::default().with_max_concurrent(7)).unwrap();

        assert_eq!(q.config().max_concurrent, 7);
        assert_eq!(q.status().max_concurrent, 7);
        assert_eq!(rx.try_recv().unwrap(), QueueEvent::ConfigUpdated);
    }
}
