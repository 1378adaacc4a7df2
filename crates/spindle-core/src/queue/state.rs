//! Scheduler bookkeeping guarded by the queue mutex.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::dedup::DedupTable;
use super::dependency::DependencyGraph;
use super::pending::PendingList;
use super::record::TaskRecord;
use super::results::ResultStore;
use super::retry::RetryPolicy;
use super::status::QueueCounts;
use crate::config::QueueConfig;
use crate::domain::TaskId;
use crate::error::TaskError;
use crate::executor::ExecutorRegistry;

/// A task handed to an executor.
///
/// `lease` identifies this attempt. A supervisor or progress report whose
/// lease no longer matches the running entry is stale and is dropped.
#[derive(Debug)]
pub(crate) struct RunningTask {
    pub record: TaskRecord,
    pub lease: u64,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
    pub progress: u8,
    pub cancel: CancellationToken,
}

/// A task sleeping through its retry backoff.
#[derive(Debug)]
pub(crate) struct RetryingTask {
    pub record: TaskRecord,
    pub due_at: Instant,
    pub last_error: TaskError,
}

pub(crate) struct QueueState {
    pub config: QueueConfig,
    pub retry_policy: RetryPolicy,
    pub executors: ExecutorRegistry,

    pub pending: PendingList,
    pub running: HashMap<TaskId, RunningTask>,
    pub retrying: HashMap<TaskId, RetryingTask>,
    pub results: ResultStore,
    pub dedup: DedupTable,
    pub deps: DependencyGraph,

    pub paused: bool,
    pub next_lease: u64,

    /// Armed while nothing is pending, running or retrying.
    pub idle_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the idle timer is disarmed so a timer that already
    /// fired can tell it is stale.
    pub idle_generation: u64,

    /// Cumulative totals. Live counts are filled in at snapshot time.
    pub totals: QueueCounts,
}

impl QueueState {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            retry_policy: RetryPolicy::from_config(&config),
            results: ResultStore::new(config.max_results),
            config,
            executors: ExecutorRegistry::new(),
            pending: PendingList::new(),
            running: HashMap::new(),
            retrying: HashMap::new(),
            dedup: DedupTable::new(),
            deps: DependencyGraph::new(),
            paused: false,
            next_lease: 0,
            idle_timer: None,
            idle_generation: 0,
            totals: QueueCounts::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty() && self.retrying.is_empty()
    }

    pub fn next_lease(&mut self) -> u64 {
        self.next_lease += 1;
        self.next_lease
    }

    /// True when `lease` is the current attempt of running task `id`.
    pub fn holds_lease(&self, id: TaskId, lease: u64) -> bool {
        self.running.get(&id).is_some_and(|r| r.lease == lease)
    }

    pub fn disarm_idle(&mut self) {
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }
        self.idle_generation += 1;
    }

    /// Drop every live task and all bookkeeping. Configuration is kept.
    pub fn reset(&mut self) {
        self.disarm_idle();
        self.executors.clear();
        self.pending.drain();
        self.running.clear();
        self.retrying.clear();
        self.results.clear();
        self.dedup.clear();
        self.deps.clear();
        self.paused = false;
        self.totals = QueueCounts::default();
    }
}
