// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The in-memory event queue shared between producers and one background
//! writer task.
//!
//! Producers append under a dedicated mutex held only for the push itself;
//! the writer swaps the whole deque out under that same short lock, so an
//! enqueue never waits on in-flight I/O. Depth is tracked in an atomic so
//! the admission check on the write path reads it without taking the lock.

use chrono::{DateTime, Utc};
use logship::LogEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// One queued event plus its enqueue timestamp.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub event: LogEvent,
}

impl LogRecord {
    pub fn new(event: LogEvent) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordQueue {
    records: Mutex<VecDeque<LogRecord>>,
    depth: AtomicI64,
}

impl RecordQueue {
    pub(crate) fn new() -> Self {
        RecordQueue::default()
    }

    /// Appends one record and returns the new queue depth.
    pub(crate) fn push(&self, record: LogRecord) -> i64 {
        // Lock poisoning is unreachable: no panic can occur inside the
        // critical sections below.
        #[allow(clippy::expect_used)]
        let mut records = self.records.lock().expect("lock poisoned");
        records.push_back(record);
        drop(records);
        self.depth.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Swaps the queue out for an empty one and returns the drained records
    /// in enqueue order.
    pub(crate) fn drain(&self) -> VecDeque<LogRecord> {
        #[allow(clippy::expect_used)]
        let mut records = self.records.lock().expect("lock poisoned");
        let drained = std::mem::take(&mut *records);
        drop(records);
        self.depth.fetch_sub(drained.len() as i64, Ordering::Relaxed);
        drained
    }

    pub(crate) fn depth(&self) -> i64 {
        self.depth.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logship::{LogEvent, LogLevel};

    #[test]
    fn test_drain_preserves_enqueue_order() {
        let queue = RecordQueue::new();
        for i in 0..100 {
            queue.push(LogRecord::new(LogEvent::message(
                LogLevel::Info,
                format!("msg-{}", i),
            )));
        }
        assert_eq!(queue.depth(), 100);

        let drained = queue.drain();
        assert_eq!(drained.len(), 100);
        assert_eq!(queue.depth(), 0);
        for (i, record) in drained.iter().enumerate() {
            assert_eq!(record.event.message, format!("msg-{}", i));
        }
    }

    #[test]
    fn test_drain_empty_queue() {
        let queue = RecordQueue::new();
        assert!(queue.drain().is_empty());
        assert_eq!(queue.depth(), 0);
    }
}
