//! Reduced (analyzed) event types.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-dimension analysis result.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReducedHit {
    /// Estimated position. NaN if undefined.
    pub center: f64,
    /// Coordinate span of the selected hits, inclusive.
    pub uncert_lower: u32,
    /// Coordinate span of the hits in the latest time window, inclusive.
    pub uncert_upper: u32,
    /// Number of hits that contributed to `center`.
    pub hits_used: usize,
}

impl Default for ReducedHit {
    fn default() -> Self {
        Self {
            center: f64::NAN,
            uncert_lower: 0,
            uncert_upper: 0,
            hits_used: 0,
        }
    }
}

impl ReducedHit {
    /// Returns true if the center is finite and non-negative.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.center.is_finite() && self.center >= 0.0
    }

    /// Center rounded to the nearest integer coordinate.
    ///
    /// Returns `None` unless the center [`is_good`](Self::is_good).
    #[must_use]
    pub fn center_rounded(&self) -> Option<u32> {
        if !self.is_good() || self.center > f64::from(u32::MAX) {
            return None;
        }
        Some(self.center.round() as u32)
    }
}

/// Final result of one matched event.
///
/// Dimensions follow the order of the tracked planes: the first plane is `x`,
/// the second `y` and the third `z`. Untracked dimensions are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReducedEvent {
    pub x: Option<ReducedHit>,
    pub y: Option<ReducedHit>,
    pub z: Option<ReducedHit>,
    /// Earliest hit time across populated planes.
    pub time: u64,
    /// True if every tracked dimension has a good center.
    pub good: bool,
}

impl ReducedEvent {
    /// Dimensions in output order.
    #[must_use]
    pub fn dimensions(&self) -> [Option<&ReducedHit>; 3] {
        [self.x.as_ref(), self.y.as_ref(), self.z.as_ref()]
    }

    /// Mutable dimension by output index (0 = x, 1 = y, 2 = z).
    pub fn dimension_mut(&mut self, index: usize) -> Option<&mut Option<ReducedHit>> {
        match index {
            0 => Some(&mut self.x),
            1 => Some(&mut self.y),
            2 => Some(&mut self.z),
            _ => None,
        }
    }

    /// Total hits used across all dimensions.
    #[must_use]
    pub fn hits_used(&self) -> usize {
        self.dimensions()
            .iter()
            .flatten()
            .map(|dim| dim.hits_used)
            .sum()
    }
}
