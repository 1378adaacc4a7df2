#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use spindle_core::{
    ExecutorError, QueueConfig, QueueEvent, TaskId, TaskQueue, TaskResult, executor_fn,
};
use tokio::sync::broadcast;

/// Let spawned supervisors and executors run. Advances paused time by 1ms,
/// which is earlier than any timer the tests arm.
pub async fn quiesce() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn queue(config: QueueConfig) -> TaskQueue {
    TaskQueue::new(config).unwrap()
}

/// Executor that records `data.name` in start order and succeeds after `work`.
pub fn register_recorder(queue: &TaskQueue, task_type: &str, work: Duration) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    queue.register_executor(
        task_type,
        executor_fn(move |task, _ctx| {
            let log = Arc::clone(&log);
            async move {
                let name = task.data["name"].as_str().unwrap_or_default().to_string();
                log.lock().unwrap().push(name.clone());
                if !work.is_zero() {
                    tokio::time::sleep(work).await;
                }
                Ok::<_, ExecutorError>(json!({ "name": name }))
            }
        }),
    );
    seen
}

pub fn named(name: &str) -> serde_json::Value {
    json!({ "name": name })
}

pub async fn wait(queue: &TaskQueue, id: TaskId) -> TaskResult {
    queue
        .wait_for_task(id, Some(Duration::from_secs(600)))
        .await
        .unwrap()
}

/// Drain everything currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}
