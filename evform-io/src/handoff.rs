//! Single-producer/single-consumer lock-free queue.
//!
//! Two monotonically increasing cursors are advanced with release stores and
//! observed with acquire loads. Neither side ever blocks: a full queue hands
//! the value back, an empty queue returns `None`.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::ring::RingSize;

/// Bounded SPSC ring.
///
/// Used directly (`&mut self` on both ends) or split into a
/// [`QueueProducer`]/[`QueueConsumer`] pair for two threads.
pub struct HandoffQueue<T> {
    size: RingSize,
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    write: AtomicUsize,
    read: AtomicUsize,
}

// SAFETY: HandoffQueue is Send+Sync because:
// 1. A cell is written only by the producer while it is outside [read, write)
// 2. A cell is read only by the consumer while it is inside [read, write)
// 3. Cursor stores are Release and the opposite side loads them with Acquire,
//    so a cell's contents are visible before its cursor update
// 4. Only one producer and one consumer can exist (the halves are not Clone)
// 5. T: Send allows values to move between threads
unsafe impl<T: Send> Send for HandoffQueue<T> {}
unsafe impl<T: Send> Sync for HandoffQueue<T> {}

impl<T> HandoffQueue<T> {
    /// Creates an empty queue holding at most `capacity` values.
    #[must_use]
    pub fn new(capacity: RingSize) -> Self {
        let cells = (0..capacity.get())
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Self {
            size: capacity,
            cells,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    /// Maximum number of queued values.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.size.get()
    }

    /// Number of queued values. Approximate while the other side is active.
    #[must_use]
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// # Safety
    /// Only one thread may call `produce` at a time.
    unsafe fn produce(&self, value: T) -> Result<(), T> {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= self.capacity() {
            return Err(value);
        }
        let cell = &self.cells[self.size.index(write).get()];
        // SAFETY: the cell is outside [read, write), so the consumer does not
        // touch it, and there is a single producer.
        unsafe { (*cell.get()).write(value) };
        self.write.store(write.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// # Safety
    /// Only one thread may call `consume` at a time.
    unsafe fn consume(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let cell = &self.cells[self.size.index(read).get()];
        // SAFETY: the cell is inside [read, write), so it was initialized by
        // the producer (Acquire above) and is read exactly once.
        let value = unsafe { (*cell.get()).assume_init_read() };
        self.read.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Enqueues `value`, or hands it back if the queue is full.
    ///
    /// # Errors
    /// Returns `Err(value)` when full. Existing entries are untouched.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        // SAFETY: &mut self is the only handle.
        unsafe { self.produce(value) }
    }

    /// Dequeues the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: &mut self is the only handle.
        unsafe { self.consume() }
    }

    /// Splits the queue into its two thread-owned ends.
    #[must_use]
    pub fn split(self) -> (QueueProducer<T>, QueueConsumer<T>) {
        let queue = Arc::new(self);
        (
            QueueProducer {
                queue: Arc::clone(&queue),
            },
            QueueConsumer { queue },
        )
    }
}

impl<T> Drop for HandoffQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

impl<T> std::fmt::Debug for HandoffQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffQueue")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Writing end of a split [`HandoffQueue`].
#[derive(Debug)]
pub struct QueueProducer<T> {
    queue: Arc<HandoffQueue<T>>,
}

impl<T> QueueProducer<T> {
    /// Enqueues `value`, or hands it back if the queue is full.
    ///
    /// # Errors
    /// Returns `Err(value)` when full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        // SAFETY: there is exactly one producer per queue and it is borrowed
        // mutably here.
        unsafe { self.queue.produce(value) }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

/// Reading end of a split [`HandoffQueue`].
#[derive(Debug)]
pub struct QueueConsumer<T> {
    queue: Arc<HandoffQueue<T>>,
}

impl<T> QueueConsumer<T> {
    /// Dequeues the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: there is exactly one consumer per queue and it is borrowed
        // mutably here.
        unsafe { self.queue.consume() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
