//! Event reduction.
//!
//! Each populated plane of an event is reduced independently to a center
//! coordinate with two uncertainty spans:
//!
//! - `uncert_lower`: coordinate span of the hits selected for the center.
//! - `uncert_upper`: coordinate span of the hits in the latest time window,
//!   walking back from the last hit over at most `max_timebins` distinct times
//!   no earlier than `max_timedif` before it.
#![allow(clippy::cast_precision_loss)]

use evform_core::analysis::{AnalyzerConfig, EventReduction, Selection};
use evform_core::clustering::Cluster;
use evform_core::event::Event;
use evform_core::hit::Hit;
use evform_core::reduced::{ReducedEvent, ReducedHit};
use evform_core::trace::{targets, Trace};
use log::Level;

/// Reduces matched events into per-dimension coordinates.
#[derive(Debug, Clone)]
pub struct EventAnalyzer {
    config: AnalyzerConfig,
    trace: Trace,
}

impl EventAnalyzer {
    /// Creates an analyzer with the given configuration.
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            trace: Trace::new(targets::ANALYZER),
        }
    }

    /// Replaces the logging context.
    #[must_use]
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    /// Logging context.
    #[must_use]
    pub fn trace(&self) -> Trace {
        self.trace
    }

    fn select<'a>(&self, hits: &'a [Hit]) -> Vec<&'a Hit> {
        match self.config.selection {
            Selection::MaxWeight => {
                let max = hits.iter().map(|hit| hit.weight).max().unwrap_or(0);
                hits.iter().filter(|hit| hit.weight == max).collect()
            }
            Selection::LatestTime => {
                let latest = hits.iter().map(|hit| hit.time).max().unwrap_or(0);
                hits.iter().filter(|hit| hit.time == latest).collect()
            }
            Selection::All => hits.iter().collect(),
        }
    }

    fn center(&self, selected: &[&Hit]) -> f64 {
        let weight_sum: f64 = selected.iter().map(|hit| f64::from(hit.weight)).sum();
        if weight_sum <= 0.0 {
            return f64::NAN;
        }
        if self.config.weighted {
            let mass: f64 = selected
                .iter()
                .map(|hit| f64::from(hit.weight) * f64::from(hit.coordinate))
                .sum();
            mass / weight_sum
        } else {
            let sum: f64 = selected.iter().map(|hit| f64::from(hit.coordinate)).sum();
            sum / selected.len() as f64
        }
    }

    fn upper_uncertainty(&self, cluster: &Cluster) -> u32 {
        let mut by_time: Vec<&Hit> = cluster.hits().iter().collect();
        by_time.sort_by(|a, b| b.time.cmp(&a.time));

        let earliest = cluster.time_end().saturating_sub(self.config.max_timedif);
        let mut bins: Vec<u64> = Vec::with_capacity(self.config.max_timebins);
        let mut bounds: Option<(u16, u16)> = None;
        for hit in by_time {
            if hit.time < earliest {
                break;
            }
            if !bins.contains(&hit.time) {
                if bins.len() >= self.config.max_timebins {
                    break;
                }
                bins.push(hit.time);
            }
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(hit.coordinate), hi.max(hit.coordinate)),
                None => (hit.coordinate, hit.coordinate),
            });
        }
        bounds.map_or(0, |(lo, hi)| coord_span(lo, hi))
    }

    /// Reduces a single cluster.
    #[must_use]
    pub fn analyze_cluster(&self, cluster: &Cluster) -> ReducedHit {
        if cluster.is_empty() {
            return ReducedHit::default();
        }
        let selected = self.select(cluster.hits());
        let lo = selected.iter().map(|hit| hit.coordinate).min().unwrap_or(0);
        let hi = selected.iter().map(|hit| hit.coordinate).max().unwrap_or(0);

        ReducedHit {
            center: self.center(&selected),
            uncert_lower: coord_span(lo, hi),
            uncert_upper: self.upper_uncertainty(cluster),
            hits_used: selected.len(),
        }
    }
}

impl Default for EventAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn coord_span(lo: u16, hi: u16) -> u32 {
    u32::from(hi - lo) + 1
}

impl EventReduction for EventAnalyzer {
    fn name(&self) -> &'static str {
        match self.config.selection {
            Selection::MaxWeight => "MaxWeight",
            Selection::LatestTime => "uTPC",
            Selection::All => "CenterOfMass",
        }
    }

    fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Tracked planes without a cluster reduce to a default (NaN) dimension,
    /// which marks the event as not good.
    fn analyze(&self, event: &Event) -> ReducedEvent {
        let mut reduced = ReducedEvent {
            time: event.time_start(),
            good: true,
            ..ReducedEvent::default()
        };

        for (index, &plane) in event.planes().iter().enumerate() {
            let dimension = event
                .cluster(plane)
                .map(|cluster| self.analyze_cluster(cluster))
                .unwrap_or_default();
            reduced.good &= dimension.is_good();
            if let Some(slot) = reduced.dimension_mut(index) {
                *slot = Some(dimension);
            }
        }
        if event.planes().is_empty() {
            reduced.good = false;
        }

        if !reduced.good && self.trace.enabled(Level::Trace) {
            log::trace!(
                target: self.trace.target(),
                "bad event at {}: {:?}",
                reduced.time,
                reduced.dimensions()
            );
        }
        reduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn analyzer(weighted: bool) -> EventAnalyzer {
        EventAnalyzer::new(AnalyzerConfig::new().with_weighted(weighted))
    }

    fn plane_cluster(plane: u8, hits: &[(u64, u16, u16)]) -> Cluster {
        hits.iter()
            .map(|&(time, coordinate, weight)| Hit::new(time, plane, coordinate, weight))
            .collect()
    }

    #[test]
    fn test_max_weight_ties_included() {
        let cluster = plane_cluster(0, &[(0, 0, 4), (0, 1, 4), (0, 2, 2)]);
        let hit = analyzer(false).analyze_cluster(&cluster);
        assert_relative_eq!(hit.center, 0.5);
        assert_eq!(hit.hits_used, 2);
        assert_eq!(hit.uncert_lower, 2);
    }

    #[test]
    fn test_weighted_center() {
        let cluster = plane_cluster(0, &[(0, 2, 1), (0, 4, 1), (0, 9, 0)]);
        let hit = EventAnalyzer::new(
            AnalyzerConfig::new()
                .with_weighted(true)
                .with_selection(Selection::All),
        )
        .analyze_cluster(&cluster);
        assert_relative_eq!(hit.center, 3.0);
        assert_eq!(hit.hits_used, 3);
        assert_eq!(hit.uncert_lower, 8);
    }

    #[test]
    fn test_zero_weight_is_nan() {
        let cluster = plane_cluster(0, &[(0, 3, 0), (1, 4, 0)]);
        for weighted in [true, false] {
            let hit = analyzer(weighted).analyze_cluster(&cluster);
            assert!(hit.center.is_nan());
            assert!(!hit.is_good());
            assert_eq!(hit.hits_used, 2);
        }
    }

    #[test]
    fn test_degenerate_event_not_good() {
        let mut event = Event::new(&[0, 1]);
        event.merge(&mut plane_cluster(0, &[(0, 3, 0)]));
        event.merge(&mut plane_cluster(1, &[(0, 3, 5)]));
        let reduced = analyzer(true).analyze(&event);
        assert!(!reduced.good);
        assert!(reduced.x.unwrap().center.is_nan());
        assert_relative_eq!(reduced.y.unwrap().center, 3.0);
    }

    #[test]
    fn test_latest_time_selection() {
        let cluster = plane_cluster(0, &[(5, 1, 9), (7, 4, 1), (7, 6, 1)]);
        let analyzer = EventAnalyzer::new(
            AnalyzerConfig::new()
                .with_weighted(false)
                .with_selection(Selection::LatestTime),
        );
        let hit = analyzer.analyze_cluster(&cluster);
        assert_relative_eq!(hit.center, 5.0);
        assert_eq!(hit.hits_used, 2);
        assert_eq!(analyzer.name(), "uTPC");
    }

    fn windowed(max_timedif: u64, max_timebins: usize) -> EventAnalyzer {
        EventAnalyzer::new(
            AnalyzerConfig::new()
                .with_max_timedif(max_timedif)
                .with_max_timebins(max_timebins),
        )
    }

    #[test]
    fn test_upper_uncertainty_window() {
        let cluster = plane_cluster(0, &[(2, 20, 1), (8, 3, 1), (9, 7, 1), (10, 5, 1)]);
        assert_eq!(windowed(7, 3).analyze_cluster(&cluster).uncert_upper, 5);
        assert_eq!(windowed(7, 2).analyze_cluster(&cluster).uncert_upper, 3);
        assert_eq!(windowed(0, 3).analyze_cluster(&cluster).uncert_upper, 1);
    }

    #[test]
    fn test_repeated_times_share_a_bin() {
        let cluster = plane_cluster(0, &[(9, 1, 1), (10, 5, 1), (10, 8, 1)]);
        assert_eq!(windowed(10, 1).analyze_cluster(&cluster).uncert_upper, 4);
    }

    #[test]
    fn test_missing_plane_not_good() {
        let mut event = Event::new(&[0, 1]);
        event.merge(&mut plane_cluster(0, &[(4, 3, 5)]));
        let reduced = analyzer(true).analyze(&event);
        assert!(!reduced.good);
        assert!(reduced.x.unwrap().is_good());
        assert_eq!(reduced.y.unwrap().hits_used, 0);
        assert!(reduced.z.is_none());
        assert_eq!(reduced.time, 4);
    }

    #[test]
    fn test_event_time_is_earliest_start() {
        let mut event = Event::new(&[0, 1, 2]);
        event.merge(&mut plane_cluster(0, &[(14, 3, 5)]));
        event.merge(&mut plane_cluster(1, &[(12, 3, 5), (20, 4, 5)]));
        event.merge(&mut plane_cluster(2, &[(13, 0, 5)]));
        let reduced = analyzer(true).analyze(&event);
        assert!(reduced.good);
        assert_eq!(reduced.time, 12);
        assert_eq!(reduced.hits_used(), 4);
        assert_relative_eq!(reduced.z.unwrap().center, 0.0);
    }
}
