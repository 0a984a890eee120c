// packages/observer/src/logging/write_queue.rs
//! Bounded in-memory write queue
//!
//! The only rendezvous point between producer threads and the file task
//! executor. Holds encoded event strings in FIFO order under a hard memory
//! cap; when the writer falls behind and the cap is exceeded, the oldest
//! events are dropped so the most recent ones survive.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

struct QueueInner {
    /// Encoded events waiting to be written
    queue: VecDeque<String>,

    /// Bytes currently held by `queue`
    memory: u64,

    /// Total events dropped due to overflow
    dropped: u64,
}

/// Thread-safe FIFO of encoded events with a hard memory cap.
///
/// Producers `push`; the file task executor drains with `swap`. One lock
/// guards all shared state and is never held across I/O.
pub struct WriteQueue {
    inner: Mutex<QueueInner>,

    /// Maximum bytes the queue may hold, or [`crate::logging::NO_LIMIT`]
    memory_max: u64,
}

impl WriteQueue {
    /// Create a queue bounded to `memory_max` bytes
    pub fn new(memory_max: u64) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                memory: 0,
                dropped: 0,
            }),
            memory_max,
        }
    }

    /// Enqueue an encoded event and return the post-push queue length.
    ///
    /// If adding the event pushed the byte count past the cap, events are
    /// dropped from the front (oldest first) until the count fits again. A
    /// single event larger than the cap empties the queue entirely.
    pub fn push(&self, event: String) -> usize {
        let mut dropped_now = 0u64;

        let len = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

            inner.memory += event.len() as u64;
            inner.queue.push_back(event);

            while inner.memory > self.memory_max {
                let Some(front) = inner.queue.pop_front() else {
                    break;
                };
                inner.memory -= front.len() as u64;
                dropped_now += 1;
            }

            inner.dropped += dropped_now;
            inner.queue.len()
        };

        if dropped_now > 0 {
            trace!(dropped = dropped_now, "write queue overflow, dropped oldest events");
        }

        len
    }

    /// Exchange the internal queue with `local_queue` (which must be empty)
    /// and reset the byte counter. O(1); used by the file task executor to
    /// drain atomically.
    pub fn swap(&self, local_queue: &mut VecDeque<String>) {
        debug_assert!(local_queue.is_empty());

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::swap(&mut inner.queue, local_queue);
        inner.memory = 0;
    }

    /// Snapshot of queue counters
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        QueueStats {
            len: inner.queue.len(),
            memory: inner.memory,
            memory_max: self.memory_max,
            dropped: inner.dropped,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Events currently queued
    pub len: usize,

    /// Bytes currently queued
    pub memory: u64,

    /// Memory cap, or [`crate::logging::NO_LIMIT`]
    pub memory_max: u64,

    /// Total events dropped due to overflow
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NO_LIMIT;
    use std::sync::Arc;

    #[test]
    fn test_push_returns_length() {
        let queue = WriteQueue::new(NO_LIMIT);

        assert_eq!(queue.push("a".repeat(10)), 1);
        assert_eq!(queue.push("b".repeat(10)), 2);
        assert_eq!(queue.stats().memory, 20);
    }

    #[test]
    fn test_swap_drains_queue() {
        let queue = WriteQueue::new(NO_LIMIT);
        queue.push("one".to_string());
        queue.push("two".to_string());

        let mut local = VecDeque::new();
        queue.swap(&mut local);

        assert_eq!(local.len(), 2);
        assert_eq!(local.pop_front().unwrap(), "one");
        assert_eq!(local.pop_front().unwrap(), "two");

        let stats = queue.stats();
        assert_eq!(stats.len, 0);
        assert_eq!(stats.memory, 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        // Cap of 400 bytes; one hundred 10-byte events leaves the last 40.
        let queue = WriteQueue::new(400);

        let mut last_len = 0;
        for i in 0..100 {
            last_len = queue.push(format!("{i:010}"));
        }

        assert_eq!(last_len, 40);

        let stats = queue.stats();
        assert_eq!(stats.dropped, 60);
        assert_eq!(stats.memory, 400);

        let mut local = VecDeque::new();
        queue.swap(&mut local);
        assert_eq!(local.front().unwrap(), "0000000060");
        assert_eq!(local.back().unwrap(), "0000000099");
    }

    #[test]
    fn test_memory_never_exceeds_cap() {
        let queue = WriteQueue::new(100);

        for i in 0..50 {
            queue.push("x".repeat(7 + (i % 5)));
            assert!(queue.stats().memory <= 100);
        }
    }

    #[test]
    fn test_single_event_larger_than_cap() {
        let queue = WriteQueue::new(16);

        let len = queue.push("y".repeat(64));
        assert_eq!(len, 0);

        let stats = queue.stats();
        assert_eq!(stats.memory, 0);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_concurrent_pushes() {
        use std::thread;

        let queue = Arc::new(WriteQueue::new(NO_LIMIT));
        let mut handles = vec![];

        for t in 0..8 {
            let q = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    q.push(format!("event_{t}_{i}"));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.stats().len, 800);
    }
}
