//! 型付き Handler の登録と投入
//!
//! `register_handler::<T, _>()` は内部的に `TypedExecutor` でラップして
//! `T::TYPE` に登録する。`enqueue_typed(&T)` はペイロードを JSON にして投入する。
//! どちらも文字列の task_type を書かないので typo が起きない。

use std::sync::Arc;

use super::handler::{Handler, TypedExecutor};
use super::task::TaskPayload;
use crate::domain::{TaskId, TaskOptions, TaskType};
use crate::queue::TaskQueue;

impl TaskQueue {
    /// Register `handler` for `T::TYPE`, replacing any previous executor.
    pub fn register_handler<T, H>(&self, handler: H)
    where
        T: TaskPayload,
        H: Handler<T> + 'static,
    {
        self.register_executor_arc(
            TaskType::new(T::TYPE),
            Arc::new(TypedExecutor::<T, H>::new(handler)),
        );
    }

    /// Serialize `payload` and admit it under `T::TYPE`.
    ///
    /// `Ok(None)` means the admission was suppressed by deduplication.
    pub fn enqueue_typed<T: TaskPayload>(
        &self,
        payload: &T,
        options: TaskOptions,
    ) -> Result<Option<TaskId>, serde_json::Error> {
        let data = serde_json::to_value(payload)?;
        Ok(self.enqueue(T::TYPE, data, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::domain::TaskStatus;
    use crate::error::{ExecutorError, TaskError};
    use crate::queue::ExecutionContext;
    use crate::typed::task::fixtures::Sum;
    use async_trait::async_trait;
    use serde_json::json;

    struct SumHandler;

    #[async_trait]
    impl Handler<Sum> for SumHandler {
        type Output = i64;

        async fn handle(&self, task: Sum, ctx: ExecutionContext) -> Result<i64, ExecutorError> {
            ctx.report_progress(100);
            Ok(task.values.iter().sum())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn typed_roundtrip_through_queue() {
        let queue = TaskQueue::new(QueueConfig::default()).unwrap();
        queue.register_handler::<Sum, _>(SumHandler);
        assert!(queue.has_executor(&TaskType::new(Sum::TYPE)));

        let id = queue
            .enqueue_typed(&Sum { values: vec![2, 3] }, TaskOptions::new())
            .unwrap()
            .unwrap();
        let result = queue.wait_for_task(id, None).await.unwrap();

        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.data, Some(json!(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn bad_payload_fails_without_retry() {
        let queue = TaskQueue::new(QueueConfig::default()).unwrap();
        queue.register_handler::<Sum, _>(SumHandler);

        let id = queue
            .enqueue(Sum::TYPE, json!({ "values": 7 }), TaskOptions::new().with_max_retries(3))
            .unwrap();
        let result = queue.wait_for_task(id, None).await.unwrap();

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retries, 0);
        assert!(matches!(result.error, Some(TaskError::InvalidPayload(_))));
    }
}
