//! Bounded in-memory record store shared by every engine.

use parking_lot::RwLock;
use std::collections::VecDeque;
use uuid::Uuid;

/// A record that can be kept in a [`RecordStore`].
pub trait StoredRecord: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

/// Insertion-ordered record store that evicts the oldest records once
/// `max_records` is exceeded.
#[derive(Debug)]
pub struct RecordStore<R> {
    records: RwLock<VecDeque<R>>,
    max_records: usize,
}

impl<R: StoredRecord> RecordStore<R> {
    /// Create a store holding at most `max_records` (at least one).
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Append a record, evicting from the front when over capacity.
    /// Returns the number of evicted records.
    pub fn insert(&self, record: R) -> usize {
        let mut records = self.records.write();
        records.push_back(record);

        let mut evicted = 0;
        while records.len() > self.max_records {
            records.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn get(&self, id: Uuid) -> Option<R> {
        self.records.read().iter().find(|r| r.id() == id).cloned()
    }

    /// Records matching `predicate`, newest first, at most `limit`.
    pub fn list<F>(&self, predicate: F, limit: usize) -> Vec<R>
    where
        F: Fn(&R) -> bool,
    {
        self.records
            .read()
            .iter()
            .rev()
            .filter(|r| predicate(r))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Clone of every record in insertion order.
    pub fn snapshot(&self) -> Vec<R> {
        self.records.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Remove every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut records = self.records.write();
        let removed = records.len();
        records.clear();
        removed
    }
}
