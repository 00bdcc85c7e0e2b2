//! Fixed-capacity FIFO between the acquisition and logging threads.

use crate::health::FailureCounter;
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Circular queue that refuses new entries when full instead of overwriting.
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    count: usize,
    drops: FailureCounter,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            count: 0,
            drops: FailureCounter::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Total entries rejected because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.drops.total()
    }

    /// Append at the tail; a full buffer hands the entry back
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            if let Some(streak) = self.drops.record_failure() {
                warn!(
                    "Ring buffer full ({} entries), dropped {} sample(s) in a row",
                    self.slots.len(),
                    streak
                );
            }
            return Err(item);
        }
        let tail = (self.head + self.count) % self.slots.len();
        self.slots[tail] = Some(item);
        self.count += 1;
        self.drops.record_success();
        Ok(())
    }

    /// Remove the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.count -= 1;
        item
    }
}

/// Ring shared by one producer thread and one consumer thread.
///
/// Critical sections only move one entry; callers do their I/O after the
/// guard is gone.
pub struct SharedRing<T> {
    inner: Arc<Mutex<RingBuffer<T>>>,
}

impl<T> Clone for SharedRing<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    // Every mutation leaves head/count consistent, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, RingBuffer<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns false when the entry was dropped
    pub fn push(&self, item: T) -> bool {
        self.lock().push(item).is_ok()
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.lock().dropped()
    }
}
