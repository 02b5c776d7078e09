//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or file I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Slot buffer misuse.
    #[error("slot error: {0}")]
    Slot(#[from] SlotError),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] evform_core::Error),
}

/// Errors reported by [`SlotBuffer`](crate::SlotBuffer).
///
/// A guard violation is only returned as a value by
/// [`verify_guard`](crate::SlotBuffer::verify_guard); the receive path
/// panics with it instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// A length larger than the slot was stored.
    #[error("length {length} exceeds capacity {capacity} of slot {index}")]
    LengthExceedsCapacity {
        index: usize,
        length: usize,
        capacity: usize,
    },

    /// The sentinel behind a slot was overwritten.
    #[error("guard bytes of slot {index} overwritten")]
    GuardViolation { index: usize },

    /// Slot index outside the buffer.
    #[error("slot index {index} out of range for {slots} slots")]
    IndexOutOfRange { index: usize, slots: usize },

    /// Zero slots or zero-sized slots.
    #[error("invalid slot geometry: {slots} slots of {slot_size} bytes")]
    InvalidGeometry { slots: usize, slot_size: usize },
}

impl From<evform_core::ConfigError> for Error {
    fn from(err: evform_core::ConfigError) -> Self {
        Self::Core(err.into())
    }
}
