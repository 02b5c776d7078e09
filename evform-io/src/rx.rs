//! Receive channel: a [`SlotBuffer`] shared by a producer and a consumer
//! thread, with slot ownership passed through a [`HandoffQueue`].
//!
//! The producer fills the slot at its cursor and pushes the slot index. The
//! consumer pops an index and reads the slot until its next pop. The queue
//! holds at most `slots - 2` indices, so the slot being filled is never one
//! that is queued or held by the consumer.
#![allow(unsafe_code)]

use std::sync::Arc;

use crate::error::SlotError;
use crate::handoff::{HandoffQueue, QueueConsumer, QueueProducer};
use crate::ring::{RingSize, SlotIndex};
use crate::slot_buffer::SlotBuffer;

/// Smallest slot count that leaves room for one queued slot.
pub const MIN_SLOTS: usize = 3;

/// Outcome of one receive into the producer's current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Nothing was received; the slot stays with the producer.
    Empty,
    /// `n` bytes were handed to the consumer.
    Queued(usize),
    /// `n` bytes were received but the queue was full. The slot is reused.
    Dropped(usize),
}

/// Creates a connected producer/consumer pair over `slots` slots.
///
/// # Errors
/// Returns [`SlotError::InvalidGeometry`] for fewer than [`MIN_SLOTS`] slots
/// or a zero slot size.
pub fn rx_channel(slots: usize, slot_size: usize) -> Result<(RxProducer, RxConsumer), SlotError> {
    let capacity = RingSize::new(slots.saturating_sub(MIN_SLOTS - 1))
        .ok_or(SlotError::InvalidGeometry { slots, slot_size })?;
    let buffer = Arc::new(SlotBuffer::new(slots, slot_size)?);
    let (queue_producer, queue_consumer) = HandoffQueue::new(capacity).split();
    Ok((
        RxProducer {
            buffer: Arc::clone(&buffer),
            queue: queue_producer,
            cursor: SlotIndex::default(),
        },
        RxConsumer {
            buffer,
            queue: queue_consumer,
        },
    ))
}

/// Filling end of the receive channel.
#[derive(Debug)]
pub struct RxProducer {
    buffer: Arc<SlotBuffer>,
    queue: QueueProducer<SlotIndex>,
    cursor: SlotIndex,
}

impl RxProducer {
    /// Capacity of every slot in bytes.
    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.buffer.slot_size()
    }

    /// Slot the next receive writes into.
    #[must_use]
    pub fn current_index(&self) -> SlotIndex {
        self.cursor
    }

    /// Number of slots waiting for the consumer.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Lets `receive` fill the current slot and hands it to the consumer.
    ///
    /// `receive` gets exactly `slot_size` bytes and returns how many it
    /// wrote. On a full queue the data is dropped and the slot reused.
    ///
    /// # Errors
    /// Forwards the error of `receive`; the slot stays with the producer.
    ///
    /// # Panics
    /// Panics if `receive` reports more bytes than the slot holds, or if a
    /// guard around the slot was overwritten.
    pub fn receive_with<F, E>(&mut self, receive: F) -> Result<Received, E>
    where
        F: FnOnce(&mut [u8]) -> Result<usize, E>,
    {
        let index = self.cursor;
        // SAFETY: the cursor slot is neither queued nor held by the consumer
        // (queue capacity is slots - 2) and only this producer writes it.
        let slot = unsafe { self.buffer.shared_buffer(index) };
        let length = receive(slot)?;
        if length == 0 {
            return Ok(Received::Empty);
        }
        if let Err(err) = self.buffer.set_length(index, length) {
            panic!("receive reported more than the slot holds: {err}");
        }

        let next = index.next(self.buffer.ring_size());
        self.buffer.assert_guards(index, next);
        match self.queue.push(index) {
            Ok(()) => {
                self.cursor = next;
                Ok(Received::Queued(length))
            }
            Err(_) => Ok(Received::Dropped(length)),
        }
    }

    /// Copies `payload` into the current slot and hands it over.
    ///
    /// # Errors
    /// Returns [`SlotError::LengthExceedsCapacity`] if the payload does not
    /// fit.
    pub fn send(&mut self, payload: &[u8]) -> Result<Received, SlotError> {
        let capacity = self.slot_size();
        let index = self.cursor.get();
        self.receive_with(|slot| {
            let target = slot
                .get_mut(..payload.len())
                .ok_or(SlotError::LengthExceedsCapacity {
                    index,
                    length: payload.len(),
                    capacity,
                })?;
            target.copy_from_slice(payload);
            Ok(payload.len())
        })
    }
}

/// One popped slot, valid until the next pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub index: SlotIndex,
    pub data: &'a [u8],
}

/// Draining end of the receive channel.
#[derive(Debug)]
pub struct RxConsumer {
    buffer: Arc<SlotBuffer>,
    queue: QueueConsumer<SlotIndex>,
}

impl RxConsumer {
    /// Takes the oldest filled slot, releasing the previously popped one.
    pub fn pop(&mut self) -> Option<Datagram<'_>> {
        let index = self.queue.pop()?;
        // SAFETY: a popped index is owned by the consumer until the next pop,
        // which needs &mut self and so ends this borrow first. The producer
        // only writes slots that are neither queued nor held.
        let data = unsafe { self.buffer.shared_data(index) };
        Some(Datagram { index, data })
    }

    /// Number of slots waiting.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}
