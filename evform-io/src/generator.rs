//! Synthetic detector data for testing and replay.
//!
//! Every generated event leaves one straight track per plane: consecutive
//! coordinates read out at consecutive ticks, starting at the event time.
//! Events are spaced far enough apart that the default clusterer and matcher
//! settings separate them.

use evform_core::hit::sort_chronologically;
use evform_core::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shape of the generated data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeneratorConfig {
    pub planes: Vec<u8>,
    /// Number of events.
    pub events: usize,
    /// Ticks between event starts.
    pub spacing: u64,
    /// Hits per track.
    pub track_length: u16,
    /// Coordinates per plane.
    pub coordinates: u16,
    /// Largest hit weight.
    pub max_weight: u16,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            planes: vec![0, 1],
            events: 1000,
            spacing: 1000,
            track_length: 4,
            coordinates: 256,
            max_weight: 1000,
            seed: 0x5EED,
        }
    }
}

impl GeneratorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the planes tracks are generated on.
    #[must_use]
    pub fn with_planes(mut self, planes: &[u8]) -> Self {
        self.planes = planes.to_vec();
        self
    }

    /// Sets the number of events.
    #[must_use]
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = events;
        self
    }

    /// Sets the spacing between events.
    #[must_use]
    pub fn with_spacing(mut self, spacing: u64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Sets the number of hits per track.
    #[must_use]
    pub fn with_track_length(mut self, track_length: u16) -> Self {
        self.track_length = track_length;
        self
    }

    /// Sets the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Simple pseudo-random number generator (LCG) for reproducible data.
#[derive(Debug, Clone)]
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    /// Uniform in `0..bound`; `bound` must be positive.
    #[allow(clippy::cast_possible_truncation)]
    fn below(&mut self, bound: u16) -> u16 {
        (self.next() % u64::from(bound)) as u16
    }
}

/// Generates time-ordered hits for every event.
#[must_use]
pub fn generate_hits(config: &GeneratorConfig) -> Vec<Hit> {
    let mut rng = Lcg(config.seed);
    let length = config.track_length.max(1);
    let start_range = config.coordinates.saturating_sub(length).max(1);
    let weight_range = config.max_weight.max(1);

    let mut hits =
        Vec::with_capacity(config.events * config.planes.len() * usize::from(length));
    let mut time = 0u64;
    for _ in 0..config.events {
        for &plane in &config.planes {
            let start = rng.below(start_range);
            for step in 0..length {
                let weight = 1 + rng.below(weight_range);
                hits.push(Hit::new(
                    time + u64::from(step),
                    plane,
                    start + step,
                    weight,
                ));
            }
        }
        time += config.spacing;
    }
    sort_chronologically(&mut hits);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_count_and_order() {
        let config = GeneratorConfig::new().with_events(20).with_track_length(3);
        let hits = generate_hits(&config);
        assert_eq!(hits.len(), 20 * 2 * 3);
        assert!(hits.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(hits.iter().all(|hit| hit.weight >= 1 && hit.coordinate < 256));
    }

    #[test]
    fn test_same_seed_same_data() {
        let config = GeneratorConfig::new().with_events(50);
        assert_eq!(generate_hits(&config), generate_hits(&config));
        assert_ne!(
            generate_hits(&config),
            generate_hits(&config.clone().with_seed(1))
        );
    }

    #[test]
    fn test_tracks_are_contiguous() {
        let config = GeneratorConfig::new()
            .with_planes(&[2])
            .with_events(1)
            .with_track_length(5);
        let hits = generate_hits(&config);
        let first = hits[0].coordinate;
        for (step, hit) in hits.iter().enumerate() {
            assert_eq!(hit.plane, 2);
            assert_eq!(hit.time, step as u64);
            assert_eq!(usize::from(hit.coordinate), usize::from(first) + step);
        }
    }
}
