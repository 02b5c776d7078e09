//! Event reduction traits and configuration.

use crate::error::ConfigError;
use crate::event::Event;
use crate::reduced::ReducedEvent;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which hits of a cluster contribute to its center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Selection {
    /// Hits sharing the maximum weight, ties included.
    #[default]
    MaxWeight,
    /// Hits in the latest time bin (uTPC).
    LatestTime,
    /// Every hit (center of mass).
    All,
}

/// Configuration for event reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalyzerConfig {
    /// Weight the center by hit weight instead of a plain mean.
    pub weighted: bool,
    /// Number of distinct time bins in the upper-uncertainty window.
    pub max_timebins: usize,
    /// Width of the upper-uncertainty window, counted back from the latest hit.
    pub max_timedif: u64,
    /// Hit selection used for the center.
    pub selection: Selection,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            weighted: true,
            max_timebins: 3,
            max_timedif: 7,
            selection: Selection::MaxWeight,
        }
    }
}

impl AnalyzerConfig {
    /// Creates a new analyzer configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets weighted centers.
    #[must_use]
    pub fn with_weighted(mut self, weighted: bool) -> Self {
        self.weighted = weighted;
        self
    }

    /// Sets the number of time bins in the upper-uncertainty window.
    #[must_use]
    pub fn with_max_timebins(mut self, bins: usize) -> Self {
        self.max_timebins = bins;
        self
    }

    /// Sets the width of the upper-uncertainty window.
    #[must_use]
    pub fn with_max_timedif(mut self, dif: u64) -> Self {
        self.max_timedif = dif;
        self
    }

    /// Sets the hit selection.
    #[must_use]
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Checks the parameters.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if `max_timebins` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_timebins == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_timebins",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Trait for event reduction algorithms.
///
/// Reduction borrows the event and never fails: degenerate input yields a
/// reduced event with `good == false`.
pub trait EventReduction: Send + Sync {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Current configuration.
    fn config(&self) -> &AnalyzerConfig;

    /// Reduces one matched event.
    fn analyze(&self, event: &Event) -> ReducedEvent;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = AnalyzerConfig::new()
            .with_weighted(false)
            .with_max_timebins(5)
            .with_max_timedif(20)
            .with_selection(Selection::LatestTime);
        assert!(!config.weighted);
        assert_eq!(config.max_timebins, 5);
        assert_eq!(config.max_timedif, 20);
        assert_eq!(config.selection, Selection::LatestTime);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timebins_rejected() {
        let config = AnalyzerConfig::new().with_max_timebins(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                name: "max_timebins",
                ..
            })
        ));
    }
}
