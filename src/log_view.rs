use crate::log_buffer::LogEntry;
use crate::supervisor::SupervisorView;
use std::collections::VecDeque;

/// Number of lines a log view keeps on display
pub const DEFAULT_VIEW_LINES: usize = 500;

/// Consumer-side display history fed by draining the supervisor's log buffer
#[derive(Debug, Clone)]
pub struct LogView {
    lines: VecDeque<LogEntry>,
    max_lines: usize,
}

impl LogView {
    pub fn new() -> Self {
        Self::with_max_lines(DEFAULT_VIEW_LINES)
    }

    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
        }
    }

    /// Pull new entries from the supervisor.
    ///
    /// Returns the entries that were appended, oldest first.
    pub fn refresh(&mut self, view: &SupervisorView) -> Vec<LogEntry> {
        let fresh = view.drain_log();
        self.extend(fresh.iter().cloned());
        fresh
    }

    /// Append entries, trimming the oldest beyond the display limit
    pub fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.lines.extend(entries);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Clear the display; the supervisor's buffer is unaffected
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogEntry> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for LogView {
    fn default() -> Self {
        Self::new()
    }
}
