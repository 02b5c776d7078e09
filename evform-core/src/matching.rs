//! Matcher configuration.

use crate::error::ConfigError;
use crate::event::MAX_PLANES;
use crate::hit::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Time attributed to a cluster by center-based matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeAlgorithm {
    /// Weight-averaged hit time.
    #[default]
    CenterOfMass,
    /// Time of the latest hit.
    Utpc,
}

/// Criterion deciding whether a cluster belongs to the event being built.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum MatchPolicyConfig {
    /// `|event.time_end - cluster.time_end| <= max_delta_time`.
    End { max_delta_time: u64 },
    /// Time-overlap fraction above `overlap_threshold`; clusters of secondary
    /// planes are also absorbed while the gap to the event is at most `max_gap`.
    Overlap { overlap_threshold: f64, max_gap: u64 },
    /// Gap between event and cluster of at most `minimum_time_gap`.
    Gap { minimum_time_gap: u64 },
    /// Cluster time within `max_delta_time` of every cluster already in the
    /// event, one cluster per plane.
    Center {
        max_delta_time: u64,
        #[cfg_attr(feature = "serde", serde(default))]
        time_algorithm: TimeAlgorithm,
    },
}

impl Default for MatchPolicyConfig {
    fn default() -> Self {
        Self::End {
            max_delta_time: 200,
        }
    }
}

/// Configuration for cross-plane matching.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatcherConfig {
    /// Tracked planes. Order defines the output dimensions x, y, z.
    pub planes: Vec<u8>,
    /// Time margin before a cluster is considered safe to finalize.
    pub latency: u64,
    /// Belonging criterion.
    pub policy: MatchPolicyConfig,
    /// Matching is skipped while fewer clusters are queued, unless flushing.
    pub minimum_queued: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            planes: vec![0, 1],
            latency: 0,
            policy: MatchPolicyConfig::default(),
            minimum_queued: 3,
        }
    }
}

impl MatcherConfig {
    /// Creates a new matcher configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tracked planes.
    #[must_use]
    pub fn with_planes(mut self, planes: &[u8]) -> Self {
        self.planes = planes.to_vec();
        self
    }

    /// Sets the latency margin.
    #[must_use]
    pub fn with_latency(mut self, latency: u64) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the belonging criterion.
    #[must_use]
    pub fn with_policy(mut self, policy: MatchPolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the population guard.
    #[must_use]
    pub fn with_minimum_queued(mut self, minimum: usize) -> Self {
        self.minimum_queued = minimum;
        self
    }

    /// Checks the tracked planes and policy parameters.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.planes.is_empty() {
            return Err(ConfigError::NoPlanes);
        }
        if self.planes.len() > MAX_PLANES {
            return Err(ConfigError::TooManyPlanes {
                max: MAX_PLANES,
                got: self.planes.len(),
            });
        }
        for (i, &plane) in self.planes.iter().enumerate() {
            if plane == Hit::INVALID_PLANE {
                return Err(ConfigError::InvalidValue {
                    name: "planes",
                    reason: format!("{plane} is reserved"),
                });
            }
            if self.planes[..i].contains(&plane) {
                return Err(ConfigError::DuplicatePlane(plane));
            }
        }
        if let MatchPolicyConfig::Overlap {
            overlap_threshold, ..
        } = self.policy
        {
            if !overlap_threshold.is_finite() || overlap_threshold < 0.0 {
                return Err(ConfigError::InvalidValue {
                    name: "overlap_threshold",
                    reason: format!("{overlap_threshold} is not a finite non-negative number"),
                });
            }
        }
        Ok(())
    }
}
