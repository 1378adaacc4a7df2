//! Deduplication table: dedup_key -> (task_id, admitted_at).

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::TaskId;

#[derive(Debug, Default)]
pub struct DedupTable {
    entries: HashMap<String, (TaskId, Instant)>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The task admitted under `key` if that admission is still within `window`.
    pub fn live(&self, key: &str, window: Duration, now: Instant) -> Option<TaskId> {
        self.entries
            .get(key)
            .filter(|(_, at)| now.saturating_duration_since(*at) < window)
            .map(|(id, _)| *id)
    }

    pub fn record(&mut self, key: String, id: TaskId, now: Instant) {
        self.entries.insert(key, (id, now));
    }

    /// Drop entries older than `window`. Returns how many were removed.
    pub fn sweep_expired(&mut self, window: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, at)| now.saturating_duration_since(*at) < window);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
