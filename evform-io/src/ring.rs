//! Index arithmetic shared by the slot buffer and the handoff queue.

use std::fmt;
use std::num::NonZeroUsize;

/// Number of positions in a ring. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingSize(NonZeroUsize);

impl RingSize {
    /// Returns `None` for a zero size.
    #[must_use]
    pub fn new(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(Self)
    }

    /// Number of positions.
    #[must_use]
    pub fn get(self) -> usize {
        self.0.get()
    }

    /// Position of a monotonically increasing cursor.
    #[must_use]
    pub fn index(self, cursor: usize) -> SlotIndex {
        SlotIndex(cursor % self.get())
    }

    /// Whether `index` addresses a position of this ring.
    #[must_use]
    pub fn contains(self, index: SlotIndex) -> bool {
        index.0 < self.get()
    }
}

/// Position within a ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Wraps a raw position. Buffers check it against their size on use.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw position.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// The following position, wrapping at `size`.
    #[must_use]
    pub fn next(self, size: RingSize) -> Self {
        size.index(self.0 + 1)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
