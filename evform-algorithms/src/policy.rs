//! Belonging policies for the matcher.
#![allow(clippy::cast_precision_loss)]

use evform_core::clustering::Cluster;
use evform_core::event::Event;
use evform_core::matching::{MatchPolicyConfig, TimeAlgorithm};

/// Decides whether a cluster belongs to the event being accumulated.
pub trait MatchPolicy: Send {
    /// Policy name.
    fn name(&self) -> &'static str;

    /// Distance of `cluster` to `event`, `None` if it does not belong.
    ///
    /// Lower is closer. Only called with a non-empty event.
    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64>;

    /// Latest `time_end` a cluster can have and still belong to `event`,
    /// given that no queued cluster spans more than `max_span` ticks.
    fn reach(&self, event: &Event, max_span: u64) -> u64;

    /// Returns true if `cluster` belongs to `event`.
    fn belongs(&self, event: &Event, cluster: &Cluster) -> bool {
        self.proximity(event, cluster).is_some()
    }
}

/// Accepts clusters ending within `max_delta_time` of the event end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndProximity {
    /// Largest accepted difference between end times.
    pub max_delta_time: u64,
}

impl EndProximity {
    /// Creates the policy.
    #[must_use]
    pub fn new(max_delta_time: u64) -> Self {
        Self { max_delta_time }
    }
}

impl MatchPolicy for EndProximity {
    fn name(&self) -> &'static str {
        "EndProximity"
    }

    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
        let delta = event.time_end().abs_diff(cluster.time_end());
        (delta <= self.max_delta_time).then_some(delta as f64)
    }

    fn reach(&self, event: &Event, _max_span: u64) -> u64 {
        event.time_end().saturating_add(self.max_delta_time)
    }
}

/// Accepts clusters whose time overlap with the event is large enough.
///
/// The overlap fraction is `overlap / cluster_span + overlap / event_span`.
/// The first tracked plane only joins through the fraction test, so each of
/// its clusters seeds a new event once it stops overlapping. Clusters of the
/// other planes are also absorbed while their gap to the event is at most
/// `max_gap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapFraction {
    /// Overlap fraction that must be exceeded.
    pub overlap_threshold: f64,
    /// Largest gap over which secondary-plane clusters are absorbed.
    pub max_gap: u64,
}

impl OverlapFraction {
    /// Creates the policy.
    #[must_use]
    pub fn new(overlap_threshold: f64, max_gap: u64) -> Self {
        Self {
            overlap_threshold,
            max_gap,
        }
    }

    /// Overlap fraction of `cluster` with `event`, 0 when disjoint.
    #[must_use]
    pub fn fraction(event: &Event, cluster: &Cluster) -> f64 {
        let overlap = event.time_overlap(cluster);
        if overlap == 0 {
            return 0.0;
        }
        let overlap = overlap as f64;
        overlap / cluster.time_span() as f64 + overlap / event.time_span() as f64
    }
}

impl MatchPolicy for OverlapFraction {
    fn name(&self) -> &'static str {
        "OverlapFraction"
    }

    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
        let fraction = Self::fraction(event, cluster);
        if fraction > 0.0 && fraction > self.overlap_threshold {
            // Fractions range over (0, 2].
            return Some(2.0 - fraction);
        }
        let primary = event.planes().first().copied();
        if cluster.plane() != primary {
            let gap = event.time_gap(cluster);
            if gap <= self.max_gap {
                return Some(2.0 + gap as f64);
            }
        }
        None
    }

    fn reach(&self, event: &Event, max_span: u64) -> u64 {
        event
            .time_end()
            .saturating_add(self.max_gap)
            .saturating_add(max_span)
    }
}

/// Accepts clusters separated from the event by at most `minimum_time_gap`.
///
/// Overlapping clusters have a gap of zero. Clusters on a plane the event
/// already holds are appended to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapProximity {
    /// Largest accepted gap.
    pub minimum_time_gap: u64,
}

impl GapProximity {
    /// Creates the policy.
    #[must_use]
    pub fn new(minimum_time_gap: u64) -> Self {
        Self { minimum_time_gap }
    }
}

impl MatchPolicy for GapProximity {
    fn name(&self) -> &'static str {
        "GapProximity"
    }

    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
        let gap = event.time_gap(cluster);
        (gap <= self.minimum_time_gap).then_some(gap as f64)
    }

    fn reach(&self, event: &Event, max_span: u64) -> u64 {
        event
            .time_end()
            .saturating_add(self.minimum_time_gap)
            .saturating_add(max_span)
    }
}

/// Accepts clusters timed within `max_delta_time` of every cluster already in
/// the event.
///
/// An event holds at most one cluster per plane: a cluster on a populated
/// plane never belongs. Proximity is the largest time difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterProximity {
    /// Largest accepted time difference.
    pub max_delta_time: u64,
    /// How a cluster's time is taken.
    pub time_algorithm: TimeAlgorithm,
}

impl CenterProximity {
    /// Creates the policy.
    #[must_use]
    pub fn new(max_delta_time: u64, time_algorithm: TimeAlgorithm) -> Self {
        Self {
            max_delta_time,
            time_algorithm,
        }
    }

    /// Time of `cluster` under the configured algorithm.
    #[must_use]
    pub fn cluster_time(&self, cluster: &Cluster) -> f64 {
        match self.time_algorithm {
            TimeAlgorithm::CenterOfMass => cluster.time_center(),
            TimeAlgorithm::Utpc => cluster.time_end() as f64,
        }
    }
}

impl MatchPolicy for CenterProximity {
    fn name(&self) -> &'static str {
        "CenterProximity"
    }

    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
        let plane = cluster.plane()?;
        if event.cluster(plane).is_some() {
            return None;
        }
        let time = self.cluster_time(cluster);
        let limit = self.max_delta_time as f64;
        let mut worst = 0.0_f64;
        for (_, member) in event.populated() {
            let delta = (self.cluster_time(member) - time).abs();
            // NaN times from weightless clusters never match.
            if delta.is_nan() || delta > limit {
                return None;
            }
            worst = worst.max(delta);
        }
        Some(worst)
    }

    fn reach(&self, event: &Event, max_span: u64) -> u64 {
        event
            .time_end()
            .saturating_add(self.max_delta_time)
            .saturating_add(max_span)
    }
}

/// Policy selected at runtime from a [`MatchPolicyConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Policy {
    /// End-time proximity.
    End(EndProximity),
    /// Time-overlap fraction.
    Overlap(OverlapFraction),
    /// Gap between event and cluster.
    Gap(GapProximity),
    /// Cluster time difference.
    Center(CenterProximity),
}

impl From<MatchPolicyConfig> for Policy {
    fn from(config: MatchPolicyConfig) -> Self {
        match config {
            MatchPolicyConfig::End { max_delta_time } => {
                Self::End(EndProximity::new(max_delta_time))
            }
            MatchPolicyConfig::Overlap {
                overlap_threshold,
                max_gap,
            } => Self::Overlap(OverlapFraction::new(overlap_threshold, max_gap)),
            MatchPolicyConfig::Gap { minimum_time_gap } => {
                Self::Gap(GapProximity::new(minimum_time_gap))
            }
            MatchPolicyConfig::Center {
                max_delta_time,
                time_algorithm,
            } => Self::Center(CenterProximity::new(max_delta_time, time_algorithm)),
        }
    }
}

impl MatchPolicy for Policy {
    fn name(&self) -> &'static str {
        match self {
            Self::End(policy) => policy.name(),
            Self::Overlap(policy) => policy.name(),
            Self::Gap(policy) => policy.name(),
            Self::Center(policy) => policy.name(),
        }
    }

    fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
        match self {
            Self::End(policy) => policy.proximity(event, cluster),
            Self::Overlap(policy) => policy.proximity(event, cluster),
            Self::Gap(policy) => policy.proximity(event, cluster),
            Self::Center(policy) => policy.proximity(event, cluster),
        }
    }

    fn reach(&self, event: &Event, max_span: u64) -> u64 {
        match self {
            Self::End(policy) => policy.reach(event, max_span),
            Self::Overlap(policy) => policy.reach(event, max_span),
            Self::Gap(policy) => policy.reach(event, max_span),
            Self::Center(policy) => policy.reach(event, max_span),
        }
    }
}
