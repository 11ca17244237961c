use tracing::trace;

use crate::{HistoryEntry, HistoryProvider};

/// A [`HistoryProvider`] that stores all navigation information in memory.
///
/// This is the backend used for server-side rendering and for hosts without a
/// platform history store. The whole session is an index-addressable stack,
/// so unlike the browser backend every operation is synchronous and
/// [`peek`](HistoryProvider::peek) can answer exactly.
pub struct MemoryHistory {
    stack: Vec<HistoryEntry>,
    index: usize,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::with_initial_entry(HistoryEntry::root())
    }
}

impl MemoryHistory {
    /// Create a [`MemoryHistory`] whose stack starts at `entry`.
    pub fn with_initial_entry(entry: HistoryEntry) -> Self {
        Self {
            stack: vec![entry],
            index: 0,
        }
    }

    /// The number of records on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the stack is empty. It never is; a fresh history starts at its
    /// initial entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The current position within the stack.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    fn target_index(&self, delta: isize) -> Option<usize> {
        let target = self.index as isize + delta;
        (0..self.stack.len() as isize)
            .contains(&target)
            .then_some(target as usize)
    }
}

impl HistoryProvider for MemoryHistory {
    fn current(&self) -> Option<HistoryEntry> {
        self.stack.get(self.index).cloned()
    }

    fn can_go_back(&self) -> bool {
        self.index > 0
    }

    fn can_go_forward(&self) -> bool {
        self.index + 1 < self.stack.len()
    }

    fn peek(&self, delta: isize) -> Option<HistoryEntry> {
        self.target_index(delta)
            .and_then(|i| self.stack.get(i).cloned())
    }

    fn push(&mut self, entry: HistoryEntry) {
        trace!(full_path = %entry.full_path, "pushing history entry");
        self.stack.truncate(self.index + 1);
        self.stack.push(entry);
        self.index += 1;
    }

    fn replace(&mut self, entry: HistoryEntry) {
        trace!(full_path = %entry.full_path, "replacing history entry");
        self.stack[self.index] = entry;
    }

    fn travel(&mut self, delta: isize) {
        if let Some(target) = self.target_index(delta) {
            self.index = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> HistoryEntry {
        HistoryEntry::new(path)
    }

    #[test]
    fn starts_at_root() {
        let history = MemoryHistory::default();

        assert_eq!(history.current(), Some(HistoryEntry::root()));
        assert!(!history.can_go_back());
        assert!(!history.can_go_forward());
    }

    #[test]
    fn push_truncates_forward_records() {
        let mut history = MemoryHistory::default();
        history.push(entry("/a"));
        history.push(entry("/b"));
        history.travel(-2);
        assert_eq!(history.current().unwrap().full_path, "/");

        history.push(entry("/c"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.current().unwrap().full_path, "/c");
        assert!(!history.can_go_forward());
    }

    #[test]
    fn replace_keeps_stack_length() {
        let mut history = MemoryHistory::default();
        history.push(entry("/a"));
        history.replace(entry("/b"));

        assert_eq!(history.len(), 2);
        assert_eq!(history.current().unwrap().full_path, "/b");
        assert!(history.can_go_back());
    }

    #[test]
    fn travel_clamps_to_stack_bounds() {
        let mut history = MemoryHistory::default();
        history.push(entry("/a"));

        history.travel(-5);
        assert_eq!(history.index(), 1);
        assert!(history.peek(-5).is_none());

        history.travel(-1);
        assert_eq!(history.current().unwrap().full_path, "/");

        history.travel(17);
        assert_eq!(history.index(), 0);
    }

    #[test]
    fn peek_does_not_move() {
        let mut history = MemoryHistory::default();
        history.push(entry("/a"));

        assert_eq!(history.peek(-1).unwrap().full_path, "/");
        assert_eq!(history.current().unwrap().full_path, "/a");
    }
}
