use std::collections::VecDeque;

use crate::entry::LogEntry;

/// Append-only store of received entries.
///
/// Unbounded unless built with [`LogBuffer::with_limit`], in which case the
/// oldest entries are dropped to keep the most recent `limit`.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    limit: Option<usize>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `limit` of 0 is treated as 1.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: Some(limit.max(1)),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn push(&mut self, entry: LogEntry) {
        if let Some(limit) = self.limit {
            while self.entries.len() >= limit {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(entry);
    }

    /// Empty the buffer, returning how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}
