//! Hit type for decoded detector readouts.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single decoded detector signal.
///
/// Hits are produced by an instrument-specific parser and are plain values:
/// once decoded they are copied, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Time in detector clock ticks.
    pub time: u64,
    /// Position within the plane (strip, wire, grid index).
    pub coordinate: u16,
    /// Amplitude (ADC or charge proxy).
    pub weight: u16,
    /// Spatial dimension this hit was read out on.
    pub plane: u8,
}

impl Hit {
    /// Sentinel used where a plane id is required but none applies.
    pub const INVALID_PLANE: u8 = u8::MAX;

    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(time: u64, plane: u8, coordinate: u16, weight: u16) -> Self {
        Self {
            time,
            coordinate,
            weight,
            plane,
        }
    }
}

/// Sorts hits chronologically, preserving the relative order of equal times.
pub fn sort_chronologically(hits: &mut [Hit]) {
    hits.sort_by_key(|hit| hit.time);
}

/// Sorts hits by increasing coordinate, preserving the relative order of ties.
pub fn sort_by_coordinate(hits: &mut [Hit]) {
    hits.sort_by_key(|hit| hit.coordinate);
}
