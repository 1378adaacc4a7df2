//! Task record: the scheduler-owned state of one live task.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::QueueConfig;
use crate::domain::{Priority, TaskId, TaskInfo, TaskOptions, TaskType};

/// Single source of truth for a task until it reaches a terminal result.
///
/// Lives in the pending list, the running map or the retrying map, never in
/// two of them at once. Executors only ever see a [`TaskInfo`] copy.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_type: TaskType,
    pub priority: Priority,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub dedup_key: Option<String>,

    /// Retries consumed so far.
    pub retry_count: u32,
    pub max_retries: u32,

    pub timeout: Duration,
    pub dependencies: Vec<TaskId>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TaskRecord {
    /// Build a record, filling unset options from `config`.
    pub fn new(
        id: TaskId,
        task_type: TaskType,
        data: serde_json::Value,
        options: TaskOptions,
        config: &QueueConfig,
        created_at: DateTime<Utc>,
    ) -> Self {
        let max_retries = options
            .max_retries
            .unwrap_or(config.default_max_retries)
            .min(config.max_retries);
        Self {
            id,
            task_type,
            priority: options.priority,
            data,
            created_at,
            dedup_key: options.dedup_key,
            retry_count: 0,
            max_retries,
            timeout: options.timeout.unwrap_or_else(|| config.default_timeout()),
            dependencies: options.dependencies,
            tags: options.tags,
            metadata: options.metadata,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Count one more retry and apply the retry priority floor.
    pub fn schedule_retry(&mut self, retry_count: u32) {
        self.retry_count = retry_count;
        self.priority = self.priority.floor_at_normal();
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            task_type: self.task_type.clone(),
            priority: self.priority,
            data: self.data.clone(),
            created_at: self.created_at,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            timeout: self.timeout,
            dependencies: self.dependencies.clone(),
            tags: self.tags.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    pub(crate) fn record(priority: Priority) -> TaskRecord {
        TaskRecord::new(
            TaskId::from(Ulid::new()),
            TaskType::new("test"),
            json!({}),
            TaskOptions::new().with_priority(priority),
            &QueueConfig::default(),
            Utc::now(),
        )
    }

    #[test]
    fn unset_options_come_from_config() {
        let config = QueueConfig::default()
            .with_default_timeout(Duration::from_secs(7))
            .with_max_retries(2, 4);
        let r = TaskRecord::new(
            TaskId::from(Ulid::new()),
            TaskType::new("ai.request"),
            json!({ "prompt": "hi" }),
            TaskOptions::new(),
            &config,
            Utc::now(),
        );

        assert_eq!(r.timeout, Duration::from_secs(7));
        assert_eq!(r.max_retries, 2);
        assert_eq!(r.priority, Priority::Normal);
    }

    #[test]
    fn max_retries_override_is_clamped() {
        let config = QueueConfig::default().with_max_retries(3, 5);
        let r = TaskRecord::new(
            TaskId::from(Ulid::new()),
            TaskType::new("ai.request"),
            json!(null),
            TaskOptions::new().with_max_retries(50),
            &config,
            Utc::now(),
        );

        assert_eq!(r.max_retries, 5);
    }

    #[test]
    fn retry_floors_priority() {
        let mut r = record(Priority::Critical);
        r.schedule_retry(1);
        assert_eq!(r.retry_count, 1);
        assert_eq!(r.priority, Priority::Normal);

        let mut r = record(Priority::Background);
        r.schedule_retry(1);
        assert_eq!(r.priority, Priority::Background);
    }

    #[test]
    fn info_is_a_copy() {
        let r = record(Priority::High);
        let mut info = r.info();
        info.tags.push("mutated".into());

        assert_eq!(info.id, r.id);
        assert!(!r.has_tag("mutated"));
    }
}
