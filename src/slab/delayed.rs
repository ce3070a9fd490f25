//! Delayed free queue ("batch mode")
//!
//! While batch mode is on, frees are only recorded here. They are executed
//! later, a bounded batch at a time, outside the caller's latency-sensitive
//! section.
//!
//! ```text
//! buf: [ consumed ... | pending ................ | spare ]
//!        0            bottom                     len     capacity
//! ```
//!
//! The consumed prefix is compacted away only once it passes
//! [`WATERMARK`] entries, so steady push/pop traffic does not memmove on
//! every call.

use std::ptr::NonNull;

/// Consumed entries tolerated before compaction
pub const WATERMARK: usize = 512;

/// Why an entry could not be queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueFull {
    /// Doubling the buffer failed
    Grow { capacity: usize },
    /// Configured entry limit reached
    Limit { limit: usize },
}

/// FIFO of pointers waiting to be freed
#[derive(Debug)]
pub struct DelayedFreeQueue {
    buf: Vec<NonNull<u8>>,
    bottom: usize,
    limit: Option<usize>,
}

impl DelayedFreeQueue {
    /// Create a queue with room for `capacity` entries
    pub fn new(capacity: usize, limit: Option<usize>) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.max(1)),
            bottom: 0,
            limit,
        }
    }

    /// Append a pointer
    ///
    /// When the buffer cannot grow the queue is left unchanged and the
    /// caller still owns the free.
    pub fn push(&mut self, ptr: NonNull<u8>) -> Result<(), QueueFull> {
        if self.bottom >= WATERMARK {
            self.buf.drain(..self.bottom);
            self.bottom = 0;
        }

        if let Some(limit) = self.limit {
            if self.len() >= limit {
                return Err(QueueFull::Limit { limit });
            }
        }

        if self.buf.len() == self.buf.capacity() {
            let capacity = self.buf.capacity().max(1) * 2;
            self.buf
                .try_reserve_exact(capacity - self.buf.len())
                .map_err(|_| QueueFull::Grow { capacity })?;
        }

        self.buf.push(ptr);
        Ok(())
    }

    /// Take the oldest pending pointer
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let ptr = *self.buf.get(self.bottom)?;
        self.bottom += 1;
        Some(ptr)
    }

    /// Pending entries
    pub fn len(&self) -> usize {
        self.buf.len() - self.bottom
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current buffer capacity in entries
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Consumed entries still occupying the front of the buffer
    pub fn consumed(&self) -> usize {
        self.bottom
    }
}
