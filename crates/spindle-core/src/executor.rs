use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{TaskInfo, TaskType};
use crate::error::ExecutorError;
use crate::queue::ExecutionContext;

/// Performs tasks of one type.
///
/// The returned value becomes `TaskResult::data`. Executors run on their own
/// Tokio task; after a timeout or cancellation they are detached rather than
/// aborted, so long-running work should watch `ctx.cancelled()`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        task: TaskInfo,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutorError>;
}

/// Adapter turning an async closure into an [`Executor`].
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap a closure as an executor.
///
/// ```ignore
/// queue.register_executor("echo", executor_fn(|task, _ctx| async move {
///     Ok(task.data)
/// }));
/// ```
pub fn executor_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(TaskInfo, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ExecutorError>> + Send + 'static,
{
    FnExecutor { f }
}

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(TaskInfo, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ExecutorError>> + Send + 'static,
{
    async fn execute(
        &self,
        task: TaskInfo,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutorError> {
        (self.f)(task, ctx).await
    }
}

/// Registry of executors (task_type -> executor).
///
/// Registration is "last wins": registering a type again replaces the
/// executor for tasks dispatched afterwards.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskType, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Returns the executor previously registered for `task_type`, if any.
    pub fn register(
        &mut self,
        task_type: TaskType,
        executor: Arc<dyn Executor>,
    ) -> Option<Arc<dyn Executor>> {
        self.executors.insert(task_type, executor)
    }

    pub fn get(&self, task_type: &TaskType) -> Option<Arc<dyn Executor>> {
        self.executors.get(task_type).cloned()
    }

    pub fn contains(&self, task_type: &TaskType) -> bool {
        self.executors.contains_key(task_type)
    }

    pub fn registered_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.executors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn clear(&mut self) {
        self.executors.clear();
    }
}
