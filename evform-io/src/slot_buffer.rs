//! Fixed-size receive slots with trailing guard bytes.
//!
//! All slots live in one contiguous allocation. Each slot is followed by
//! [`GUARD_LEN`] sentinel bytes written at construction. Safe callers only
//! ever see slices of exactly `slot_size` bytes, so the sentinel can only be
//! damaged through raw pointer writes; [`SlotBuffer::advance`] treats that as
//! memory corruption and panics.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SlotError;
use crate::ring::{RingSize, SlotIndex};

/// Number of sentinel bytes behind every slot.
pub const GUARD_LEN: usize = 8;

/// Sentinel pattern.
pub const GUARD: [u8; GUARD_LEN] = [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE, 0xF0, 0x0D];

/// Ring of fixed-size byte slots.
///
/// Lengths are stored atomically so that a slot filled on one thread can be
/// read on another once its index has been handed over.
pub struct SlotBuffer {
    size: RingSize,
    slot_size: usize,
    memory: Box<[UnsafeCell<u8>]>,
    lengths: Box<[AtomicUsize]>,
    current: SlotIndex,
}

// SAFETY: SlotBuffer is Send+Sync because:
// 1. Safe mutable access to slot bytes requires &mut self
// 2. Shared (&self) safe methods only read slot bytes or touch atomics
// 3. The crate-private shared accessors are unsafe and require the caller to
//    own the slot exclusively, which the rx channel guarantees through the
//    handoff queue
unsafe impl Send for SlotBuffer {}
unsafe impl Sync for SlotBuffer {}

impl SlotBuffer {
    /// Allocates `slots` slots of `slot_size` bytes each.
    ///
    /// # Errors
    /// Returns [`SlotError::InvalidGeometry`] if either argument is zero.
    pub fn new(slots: usize, slot_size: usize) -> Result<Self, SlotError> {
        let size = RingSize::new(slots)
            .filter(|_| slot_size > 0)
            .ok_or(SlotError::InvalidGeometry { slots, slot_size })?;
        let stride = slot_size + GUARD_LEN;
        let memory = (0..slots * stride)
            .map(|offset| {
                let within = offset % stride;
                UnsafeCell::new(if within < slot_size {
                    0
                } else {
                    GUARD[within - slot_size]
                })
            })
            .collect();
        let lengths = (0..slots).map(|_| AtomicUsize::new(0)).collect();
        Ok(Self {
            size,
            slot_size,
            memory,
            lengths,
            current: SlotIndex::default(),
        })
    }

    /// Number of slots.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.size.get()
    }

    /// Capacity of every slot in bytes.
    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of slots as a ring size.
    #[must_use]
    pub fn ring_size(&self) -> RingSize {
        self.size
    }

    /// Slot that is currently being written.
    #[must_use]
    pub fn current_index(&self) -> SlotIndex {
        self.current
    }

    fn stride(&self) -> usize {
        self.slot_size + GUARD_LEN
    }

    fn check(&self, index: SlotIndex) -> Result<(), SlotError> {
        if self.size.contains(index) {
            Ok(())
        } else {
            Err(SlotError::IndexOutOfRange {
                index: index.get(),
                slots: self.slots(),
            })
        }
    }

    fn ptr(&self, index: SlotIndex) -> *mut u8 {
        UnsafeCell::raw_get(self.memory.as_ptr().wrapping_add(index.get() * self.stride()))
    }

    /// Bytes of slot `index`, `len` long, starting at `offset`.
    ///
    /// # Safety
    /// `index` must be in range, `offset + len` must not exceed the stride,
    /// and no mutable reference to these bytes may be live.
    unsafe fn bytes(&self, index: SlotIndex, offset: usize, len: usize) -> &[u8] {
        // SAFETY: in bounds per the caller contract; UnsafeCell<u8> has the
        // layout of u8.
        unsafe { slice::from_raw_parts(self.ptr(index).add(offset), len) }
    }

    /// Mutable bytes of slot `index`, `len` long from its start.
    ///
    /// # Safety
    /// `index` must be in range, `len` must not exceed the stride, and the
    /// caller must hold exclusive access to these bytes for the returned
    /// lifetime.
    #[allow(clippy::mut_from_ref)]
    unsafe fn bytes_mut(&self, index: SlotIndex, len: usize) -> &mut [u8] {
        // SAFETY: in bounds and exclusive per the caller contract.
        unsafe { slice::from_raw_parts_mut(self.ptr(index), len) }
    }

    /// Writable region of slot `index`, exactly `slot_size` bytes.
    ///
    /// # Errors
    /// Returns [`SlotError::IndexOutOfRange`] for an invalid index.
    pub fn data_buffer(&mut self, index: SlotIndex) -> Result<&mut [u8], SlotError> {
        self.check(index)?;
        // SAFETY: index checked; &mut self rules out any other reference.
        Ok(unsafe { self.bytes_mut(index, self.slot_size) })
    }

    /// Records how many bytes of slot `index` hold data.
    ///
    /// # Errors
    /// Returns an error for an invalid index or a length above `slot_size`.
    pub fn set_length(&self, index: SlotIndex, length: usize) -> Result<(), SlotError> {
        self.check(index)?;
        if length > self.slot_size {
            return Err(SlotError::LengthExceedsCapacity {
                index: index.get(),
                length,
                capacity: self.slot_size,
            });
        }
        self.lengths[index.get()].store(length, Ordering::Release);
        Ok(())
    }

    /// Stored length of slot `index`.
    ///
    /// # Errors
    /// Returns [`SlotError::IndexOutOfRange`] for an invalid index.
    pub fn length(&self, index: SlotIndex) -> Result<usize, SlotError> {
        self.check(index)?;
        Ok(self.lengths[index.get()].load(Ordering::Acquire))
    }

    /// The first `length(index)` bytes of slot `index`.
    ///
    /// # Errors
    /// Returns [`SlotError::IndexOutOfRange`] for an invalid index.
    pub fn data(&self, index: SlotIndex) -> Result<&[u8], SlotError> {
        let length = self.length(index)?;
        // SAFETY: index checked, length bounded by set_length; mutable access
        // needs &mut self, which cannot coexist with this borrow.
        Ok(unsafe { self.bytes(index, 0, length) })
    }

    /// Checks the sentinel behind slot `index`.
    ///
    /// # Errors
    /// Returns [`SlotError::GuardViolation`] if the sentinel was overwritten.
    pub fn verify_guard(&self, index: SlotIndex) -> Result<(), SlotError> {
        self.check(index)?;
        // SAFETY: index checked; guard bytes are never handed out mutably
        // through the safe API.
        let guard = unsafe { self.bytes(index, self.slot_size, GUARD_LEN) };
        if guard == GUARD {
            Ok(())
        } else {
            Err(SlotError::GuardViolation { index: index.get() })
        }
    }

    /// Verifies the guards around a slot handover.
    ///
    /// # Panics
    /// Panics if either sentinel was overwritten.
    pub(crate) fn assert_guards(&self, written: SlotIndex, next: SlotIndex) {
        for index in [written, next] {
            if let Err(err) = self.verify_guard(index) {
                panic!("slot buffer overrun: {err}");
            }
        }
    }

    /// Moves to the next slot and returns its index.
    ///
    /// # Panics
    /// Panics if the guard behind the slot just written or the slot being
    /// entered was overwritten. Continuing after an overrun would hand
    /// corrupted data downstream.
    pub fn advance(&mut self) -> SlotIndex {
        let next = self.current.next(self.size);
        self.assert_guards(self.current, next);
        self.current = next;
        next
    }

    /// Writable region of slot `index` for the rx producer.
    ///
    /// # Safety
    /// `index` must be in range and the caller must own the slot: it is
    /// neither queued for nor held by the consumer.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn shared_buffer(&self, index: SlotIndex) -> &mut [u8] {
        // SAFETY: forwarded caller contract.
        unsafe { self.bytes_mut(index, self.slot_size) }
    }

    /// Filled region of slot `index` for the rx consumer.
    ///
    /// # Safety
    /// `index` must be in range and the producer must not write the slot
    /// while the returned slice is live.
    pub(crate) unsafe fn shared_data(&self, index: SlotIndex) -> &[u8] {
        let length = self.lengths[index.get()].load(Ordering::Acquire);
        // SAFETY: forwarded caller contract; length bounded by set_length.
        unsafe { self.bytes(index, 0, length) }
    }

    /// Whole slot including its sentinel.
    #[cfg(test)]
    pub(crate) fn raw_slot_mut(&mut self, index: SlotIndex) -> &mut [u8] {
        let stride = self.stride();
        // SAFETY: &mut self is exclusive; tests pass valid indices.
        unsafe { self.bytes_mut(index, stride) }
    }
}

impl std::fmt::Debug for SlotBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotBuffer")
            .field("slots", &self.slots())
            .field("slot_size", &self.slot_size)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
