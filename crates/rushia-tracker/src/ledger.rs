//! Ordered, deduplicated history of submitted tasks.

use chrono::{DateTime, Duration, Utc};

use crate::model::{RecordPatch, TaskRecord, TaskStatus};

/// Whether something created at `created_at` is past `window` at `now`.
///
/// An entry exactly `window` old is still valid.
#[must_use]
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - created_at > window
}

/// Most-recent-first collection of [`TaskRecord`]s keyed by task id.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    records: Vec<TaskRecord>,
    window: Duration,
}

impl HistoryLedger {
    /// Empty ledger evicting entries older than `window`.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            records: Vec::new(),
            window,
        }
    }

    /// Ledger seeded from persisted records, keeping the first occurrence of each id.
    #[must_use]
    pub fn from_records(records: Vec<TaskRecord>, window: Duration) -> Self {
        let mut seen = std::collections::HashSet::new();
        let records = records
            .into_iter()
            .filter(|record| seen.insert(record.task_id.clone()))
            .collect();
        Self { records, window }
    }

    /// Insert `record` at the front, replacing any record with the same id.
    pub fn add(&mut self, record: TaskRecord) {
        self.records.retain(|existing| existing.task_id != record.task_id);
        self.records.insert(0, record);
    }

    /// Merge `patch` into the record for `task_id`; returns whether it changed.
    pub fn update(&mut self, task_id: &str, patch: &RecordPatch) -> bool {
        self.records
            .iter_mut()
            .find(|record| record.task_id == task_id)
            .is_some_and(|record| record.apply(patch))
    }

    /// Merge `patch` only when it changes status, title or filename.
    pub fn reconcile(&mut self, task_id: &str, patch: &RecordPatch) -> bool {
        match self.records.iter_mut().find(|record| record.task_id == task_id) {
            Some(record) if record.differs_from(patch) => record.apply(patch),
            _ => false,
        }
    }

    /// Mark `task_id` as failed.
    pub fn mark_error(&mut self, task_id: &str) -> bool {
        self.update(task_id, &RecordPatch::status(TaskStatus::Error))
    }

    /// Drop entries older than the window; returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let window = self.window;
        self.records
            .retain(|record| !is_expired(record.created_at, now, window));
        before - self.records.len()
    }

    /// Number of records that have not reached a terminal status.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| !record.status.is_terminal())
            .count()
    }

    /// Ids of non-terminal records, most recent first.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| !record.status.is_terminal())
            .map(|record| record.task_id.clone())
            .collect()
    }

    /// Record for `task_id`.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&TaskRecord> {
        self.records.iter().find(|record| record.task_id == task_id)
    }

    /// All records, most recent first.
    #[must_use]
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// Expiry window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
