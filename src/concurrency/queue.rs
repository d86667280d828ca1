//! Bounded MPMC FIFO queue. See spec §4.1.
//!
//! Non-blocking by design: a full queue rejects `try_enqueue` instead of
//! parking the caller, and an empty queue rejects `try_dequeue` the same
//! way. Callers that want to wait build that on top (the executor's worker
//! loop in [`crate::executor`] is the one place in this crate that does).

use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is at capacity")]
    Full,
    #[error("queue is empty")]
    Empty,
}

/// A bounded, thread-safe FIFO. All operations may be called concurrently
/// from any number of producers and consumers.
pub struct ConcurrentQueue<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
}

impl<T> ConcurrentQueue<T> {
    /// Creates a queue that holds at most `capacity` items. A `capacity` of
    /// zero is legal but makes every `try_enqueue` fail.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Attempts to push `value` onto the back of the queue. Returns the
    /// value back to the caller (wrapped in `Err`) if the queue is full; the
    /// value is never dropped on a failed enqueue.
    pub fn try_enqueue(&self, value: T) -> Result<(), (QueueError, T)> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        if items.len() >= self.capacity {
            return Err((QueueError::Full, value));
        }
        items.push_back(value);
        Ok(())
    }

    /// Attempts to pop a value from the front of the queue.
    pub fn try_dequeue(&self) -> Result<T, QueueError> {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        items.pop_front().ok_or(QueueError::Empty)
    }

    /// Approximate count of items currently queued. This is a snapshot only
    /// — callers must not derive correctness from it, per spec §4.1.
    pub fn size(&self) -> usize {
        self.items.lock().expect("queue mutex poisoned").len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enqueue_respects_capacity() {
        let q = ConcurrentQueue::new(2);
        assert!(q.try_enqueue(1).is_ok());
        assert!(q.try_enqueue(2).is_ok());
        let err = q.try_enqueue(3);
        assert_eq!(err.unwrap_err(), (QueueError::Full, 3));
    }

    #[test]
    fn zero_capacity_always_fails_enqueue() {
        let q: ConcurrentQueue<u8> = ConcurrentQueue::new(0);
        assert_eq!(q.try_enqueue(1).unwrap_err().0, QueueError::Full);
    }

    #[test]
    fn dequeue_empty_returns_empty_error() {
        let q: ConcurrentQueue<u8> = ConcurrentQueue::new(4);
        assert_eq!(q.try_dequeue().unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn fifo_order_for_single_producer() {
        let q = ConcurrentQueue::new(8);
        q.try_enqueue("a").unwrap();
        q.try_enqueue("b").unwrap();
        q.try_enqueue("c").unwrap();
        assert_eq!(q.try_dequeue().unwrap(), "a");
        assert_eq!(q.try_dequeue().unwrap(), "b");
        assert_eq!(q.try_dequeue().unwrap(), "c");
    }

    #[test]
    fn concurrent_producers_and_consumers_never_lose_or_duplicate_items() {
        let q = Arc::new(ConcurrentQueue::new(1024));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        loop {
                            if q.try_enqueue(p * 100 + i).is_ok() {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut drained = Vec::new();
        while let Ok(v) = q.try_dequeue() {
            drained.push(v);
        }
        drained.sort_unstable();
        let expected: Vec<i32> = (0..400).collect();
        assert_eq!(drained, expected);
    }
}
