//! Priority-ordered list of job ids waiting for dispatch.

use std::collections::VecDeque;

use crate::{JobId, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: JobId,
    priority: Priority,
}

/// Pending ids in dispatch order.
///
/// Admission puts urgent jobs at the head and everything else at the tail,
/// then stably sorts by descending priority. Retried jobs go back through
/// [`PendingList::requeue`], which appends without sorting.
#[derive(Debug, Clone, Default)]
pub struct PendingList {
    entries: VecDeque<Entry>,
}

impl PendingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a freshly added job.
    pub fn admit(&mut self, id: JobId, priority: Priority) {
        let entry = Entry { id, priority };
        if priority == Priority::Urgent {
            self.entries.push_front(entry);
        } else {
            self.entries.push_back(entry);
        }
        // `sort_by` is stable, so equal priorities keep insertion order.
        self.entries
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Re-insert a job at the tail, leaving its priority unapplied.
    pub fn requeue(&mut self, id: JobId, priority: Priority) {
        self.entries.push_back(Entry { id, priority });
    }

    /// Remove `id`, returning whether it was present.
    pub fn remove(&mut self, id: JobId) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Ids in dispatch order.
    pub fn ids(&self) -> impl Iterator<Item = JobId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
