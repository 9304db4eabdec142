//! Trailing-edge debounce for editor content writes.
//!
//! # Responsibility
//! - Coalesce rapid content changes per file id into one pending write.
//!
//! # Invariants
//! - At most one pending write per file id; a newer change replaces the
//!   content and pushes the deadline.
//! - A cancelled entry is dropped, never written.
//! - Time is passed in explicitly; the debouncer owns no timer.

use crate::model::node::NodeId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Editor write debounce window.
pub const DEFAULT_CONTENT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Content ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingContent {
    pub file_id: NodeId,
    pub content: String,
    /// Deadline the entry was scheduled for.
    pub due: Instant,
}

#[derive(Debug)]
struct Entry {
    content: String,
    due: Instant,
    seq: u64,
}

/// Per-file trailing debouncer.
#[derive(Debug)]
pub struct ContentDebouncer {
    window: Duration,
    pending: HashMap<NodeId, Entry>,
    next_seq: u64,
}

impl Default for ContentDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_DEBOUNCE)
    }
}

impl ContentDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, file_id: &NodeId) -> bool {
        self.pending.contains_key(file_id)
    }

    /// Earliest deadline among pending entries.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.due).min()
    }

    /// Records a change observed at `now`.
    pub fn schedule(&mut self, file_id: NodeId, content: String, now: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            file_id,
            Entry {
                content,
                due: now + self.window,
                seq,
            },
        );
    }

    /// Removes and returns entries whose deadline has passed, oldest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingContent> {
        let due_ids: Vec<NodeId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.due <= now)
            .map(|(id, _)| id.clone())
            .collect();
        self.drain(due_ids)
    }

    /// Drops the pending write of one file; returns whether one existed.
    pub fn cancel(&mut self, file_id: &NodeId) -> bool {
        self.pending.remove(file_id).is_some()
    }

    /// Puts back an entry whose write failed; a newer change for the same
    /// file wins. Returns whether the entry was restored.
    pub fn requeue(&mut self, pending: PendingContent) -> bool {
        if self.pending.contains_key(&pending.file_id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            pending.file_id,
            Entry {
                content: pending.content,
                due: pending.due,
                seq,
            },
        );
        true
    }

    /// Removes and returns every pending entry regardless of deadline.
    pub fn take_all(&mut self) -> Vec<PendingContent> {
        let ids: Vec<NodeId> = self.pending.keys().cloned().collect();
        self.drain(ids)
    }

    fn drain(&mut self, ids: Vec<NodeId>) -> Vec<PendingContent> {
        let mut taken: Vec<(u64, PendingContent)> = ids
            .into_iter()
            .filter_map(|file_id| {
                self.pending.remove(&file_id).map(|entry| {
                    (
                        entry.seq,
                        PendingContent {
                            file_id,
                            content: entry.content,
                            due: entry.due,
                        },
                    )
                })
            })
            .collect();
        taken.sort_by_key(|(seq, _)| *seq);
        taken.into_iter().map(|(_, pending)| pending).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentDebouncer, DEFAULT_CONTENT_DEBOUNCE};
    use crate::model::node::NodeId;
    use std::time::{Duration, Instant};

    #[test]
    fn later_change_replaces_content_and_pushes_deadline() {
        let mut debouncer = ContentDebouncer::default();
        let file = NodeId::new_file();
        let start = Instant::now();

        debouncer.schedule(file.clone(), "a".to_string(), start);
        debouncer.schedule(
            file.clone(),
            "ab".to_string(),
            start + Duration::from_millis(150),
        );

        assert!(debouncer
            .take_due(start + DEFAULT_CONTENT_DEBOUNCE)
            .is_empty());
        let due = debouncer.take_due(start + Duration::from_millis(350));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].content, "ab");
        assert_eq!(debouncer.pending_len(), 0);
    }

    #[test]
    fn cancel_drops_pending_write() {
        let mut debouncer = ContentDebouncer::default();
        let file = NodeId::new_file();
        let start = Instant::now();

        debouncer.schedule(file.clone(), "draft".to_string(), start);
        assert!(debouncer.cancel(&file));
        assert!(!debouncer.cancel(&file));
        assert!(debouncer.take_due(start + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn take_all_returns_entries_in_schedule_order() {
        let mut debouncer = ContentDebouncer::new(Duration::from_secs(60));
        let first = NodeId::new_file();
        let second = NodeId::new_file();
        let now = Instant::now();

        debouncer.schedule(first.clone(), "1".to_string(), now);
        debouncer.schedule(second.clone(), "2".to_string(), now);
        assert_eq!(debouncer.next_deadline(), Some(now + Duration::from_secs(60)));

        let all = debouncer.take_all();
        let ids: Vec<_> = all.into_iter().map(|pending| pending.file_id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn requeue_restores_failed_entry_unless_superseded() {
        let mut debouncer = ContentDebouncer::default();
        let file = NodeId::new_file();
        let start = Instant::now();

        debouncer.schedule(file.clone(), "draft".to_string(), start);
        let mut taken = debouncer.take_all();
        let failed = taken.remove(0);
        assert_eq!(failed.due, start + DEFAULT_CONTENT_DEBOUNCE);

        assert!(debouncer.requeue(failed.clone()));
        assert!(debouncer.is_pending(&file));
        assert_eq!(debouncer.next_deadline(), Some(failed.due));

        debouncer.schedule(file.clone(), "newer".to_string(), start);
        assert!(!debouncer.requeue(failed));
        assert_eq!(debouncer.take_all()[0].content, "newer");
    }
}
