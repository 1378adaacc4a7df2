//! Bounded result store.

use std::collections::{HashMap, VecDeque};

use crate::domain::{TaskId, TaskResult};

/// Terminal results keyed by task id, oldest evicted first once `capacity`
/// is reached.
#[derive(Debug)]
pub struct ResultStore {
    order: VecDeque<TaskId>,
    results: HashMap<TaskId, TaskResult>,
    capacity: usize,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            results: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store `result`, returning the ids evicted to make room.
    pub fn insert(&mut self, result: TaskResult) -> Vec<TaskId> {
        let id = result.task_id;
        if self.results.insert(id, result).is_some() {
            self.order.retain(|o| *o != id);
        }
        self.order.push_back(id);
        self.evict()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskResult> {
        self.results.get(&id)
    }

    pub fn is_success(&self, id: TaskId) -> bool {
        self.results.get(&id).is_some_and(TaskResult::success)
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Vec<TaskId> {
        self.capacity = capacity.max(1);
        self.evict()
    }

    fn evict(&mut self) -> Vec<TaskId> {
        let mut evicted = Vec::new();
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.results.remove(&old);
                evicted.push(old);
            }
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskStatus, TaskType};
    use chrono::Utc;
    use ulid::Ulid;

    fn result(status: TaskStatus) -> TaskResult {
        TaskResult {
            task_id: TaskId::from(Ulid::new()),
            task_type: TaskType::new("test"),
            status,
            data: None,
            error: None,
            duration_ms: 1,
            retries: 0,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut store = ResultStore::new(2);
        let a = result(TaskStatus::Completed);
        let b = result(TaskStatus::Completed);
        let c = result(TaskStatus::Completed);

        assert!(store.insert(a.clone()).is_empty());
        assert!(store.insert(b.clone()).is_empty());
        assert_eq!(store.insert(c.clone()), vec![a.task_id]);

        assert!(store.get(a.task_id).is_none());
        assert!(store.get(b.task_id).is_some());
        assert!(store.get(c.task_id).is_some());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn success_lookup_ignores_failures() {
        let mut store = ResultStore::new(10);
        let ok = result(TaskStatus::Completed);
        let failed = result(TaskStatus::Failed);
        store.insert(ok.clone());
        store.insert(failed.clone());

        assert!(store.is_success(ok.task_id));
        assert!(!store.is_success(failed.task_id));
        assert!(!store.is_success(TaskId::from(Ulid::new())));
    }

    #[test]
    fn shrinking_capacity_evicts() {
        let mut store = ResultStore::new(3);
        let ids: Vec<TaskId> = (0..3)
            .map(|_| {
                let r = result(TaskStatus::Completed);
                let id = r.task_id;
                store.insert(r);
                id
            })
            .collect();

        assert_eq!(store.set_capacity(1), vec![ids[0], ids[1]]);
        assert_eq!(store.len(), 1);
    }
}
