//! Ordered pending list.

use std::collections::VecDeque;

use super::TaskRecord;
use crate::domain::TaskId;

/// Pending tasks in dispatch order.
///
/// Ordering: ascending priority value, ties in arrival order. With priority
/// disabled the list is plain FIFO. Dispatch scans from the front for the
/// first eligible task, so order alone does not decide what runs next.
#[derive(Debug, Default)]
pub struct PendingList {
    items: VecDeque<TaskRecord>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stable insertion: before the first item of strictly lower urgency.
    pub fn insert(&mut self, record: TaskRecord, by_priority: bool) {
        if !by_priority {
            self.items.push_back(record);
            return;
        }
        let at = self
            .items
            .iter()
            .position(|r| r.priority > record.priority)
            .unwrap_or(self.items.len());
        self.items.insert(at, record);
    }

    /// Remove and return the first record matching `eligible`.
    pub fn take_first(&mut self, mut eligible: impl FnMut(&TaskRecord) -> bool) -> Option<TaskRecord> {
        let at = self.items.iter().position(|r| eligible(r))?;
        self.items.remove(at)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        let at = self.items.iter().position(|r| r.id == id)?;
        self.items.remove(at)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.items.iter().any(|r| r.id == id)
    }

    pub fn drain(&mut self) -> Vec<TaskRecord> {
        self.items.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
