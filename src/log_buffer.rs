//! Bounded hand-off queue between the stream drainers and log observers.
//!
//! The buffer keeps at most `capacity` entries. When a push would exceed
//! the capacity, the oldest entry is evicted first. Reading drains: the
//! consumer keeps its own display history (see [`crate::log_view`]).

use chrono::{DateTime, Local, TimeZone};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

/// Default number of entries retained before eviction
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// A single timestamped log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Insertion sequence number, strictly increasing per buffer
    pub seq: u64,
    /// Milliseconds since the buffer was created (monotonic)
    pub elapsed_ms: u64,
    /// Wall-clock time in milliseconds since the Unix epoch (display only)
    pub wall_ms: i64,
    /// The line itself, including its `[OUT] ` / `Error: ` style prefix
    pub line: String,
}

impl LogEntry {
    /// Wall-clock timestamp in local time
    pub fn wall_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.wall_ms).single()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.wall_time() {
            Some(t) => write!(f, "[{}] {}", t.format("%H:%M:%S%.3f"), self.line),
            None => write!(f, "[{}] {}", self.wall_ms, self.line),
        }
    }
}

struct Inner {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

/// Bounded FIFO of log entries, safe for concurrent producers and consumers
pub struct LogBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    epoch: Instant,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
            epoch: Instant::now(),
        }
    }

    /// Append a line, evicting the oldest entry if the buffer is full
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let elapsed_ms = self.epoch.elapsed().as_millis() as u64;
        let wall_ms = chrono::Utc::now().timestamp_millis();

        let mut inner = self.inner.lock();
        if inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(LogEntry {
            seq,
            elapsed_ms,
            wall_ms,
            line,
        });
    }

    /// Remove and return every buffered entry in insertion order
    pub fn drain(&self) -> Vec<LogEntry> {
        self.inner.lock().entries.drain(..).collect()
    }

    /// Move every buffered entry into `sink`, returning how many were moved
    pub fn drain_to<E: Extend<LogEntry>>(&self, sink: &mut E) -> usize {
        let drained = self.drain();
        let count = drained.len();
        sink.extend(drained);
        count
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_push_and_drain_in_order() {
        let buffer = LogBuffer::new();
        buffer.push("first");
        buffer.push("second");
        buffer.push("third");

        let entries = buffer.drain();
        let lines: Vec<_> = entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["first", "second", "third"]);
        assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));

        // Drained entries are removed
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(format!("line {}", i));
        }

        assert_eq!(buffer.len(), 3);
        let lines: Vec<_> = buffer.drain().into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_default_capacity() {
        let buffer = LogBuffer::new();
        assert_eq!(buffer.capacity(), DEFAULT_LOG_CAPACITY);

        for i in 0..1500 {
            buffer.push(format!("{}", i));
        }
        let entries = buffer.drain();
        assert_eq!(entries.len(), 1000);
        assert_eq!(entries.first().unwrap().line, "500");
        assert_eq!(entries.last().unwrap().line, "1499");
    }

    #[test]
    fn test_clear() {
        let buffer = LogBuffer::new();
        buffer.push("a");
        buffer.push("b");
        buffer.clear();
        assert!(buffer.is_empty());

        // Sequence numbers keep increasing after a clear
        buffer.push("c");
        assert_eq!(buffer.drain()[0].seq, 2);
    }

    #[test]
    fn test_drain_to_extends_sink() {
        let buffer = LogBuffer::new();
        buffer.push("x");
        buffer.push("y");

        let mut sink = vec![];
        assert_eq!(buffer.drain_to(&mut sink), 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(buffer.drain_to(&mut sink), 0);
    }

    #[test]
    fn test_concurrent_producers_keep_last_entries() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 400;

        let buffer = Arc::new(LogBuffer::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        buffer.push(format!("{}:{}", p, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = PRODUCERS * PER_PRODUCER;
        let entries = buffer.drain();
        assert_eq!(entries.len(), total.min(DEFAULT_LOG_CAPACITY));

        // Retained entries are exactly the last pushed ones
        let expected_first_seq = (total - DEFAULT_LOG_CAPACITY) as u64;
        for (offset, entry) in entries.iter().enumerate() {
            assert_eq!(entry.seq, expected_first_seq + offset as u64);
        }

        // Per-producer order is preserved
        for p in 0..PRODUCERS {
            let indices: Vec<usize> = entries
                .iter()
                .filter_map(|e| {
                    let (producer, idx) = e.line.split_once(':')?;
                    (producer == p.to_string()).then(|| idx.parse().unwrap())
                })
                .collect();
            assert!(indices.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_entry_display_includes_line() {
        let buffer = LogBuffer::new();
        buffer.push("[OUT] hello");
        let entry = buffer.drain().remove(0);
        let rendered = entry.to_string();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with("] [OUT] hello"));
    }
}
