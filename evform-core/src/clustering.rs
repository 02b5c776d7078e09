//! Cluster type, clusterer configuration and the clustering trait.
#![allow(clippy::cast_precision_loss)]

use crate::hit::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A group of hits believed to originate from one track in one plane.
///
/// Bounds and weighted sums are kept up to date on every insertion, so the
/// cached attributes are O(1). Coordinates and times are treated as having an
/// uncertainty of one unit, so spans include both endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    hits: Vec<Hit>,
    /// `None` while empty or once hits from different planes were mixed.
    plane: Option<u8>,
    mixed_planes: bool,
    coord_start: u16,
    coord_end: u16,
    time_start: u64,
    time_end: u64,
    weight_sum: f64,
    coord_mass: f64,
    time_mass: f64,
}

impl Cluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cluster with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            hits: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Adds a hit, accumulating sums and widening the bounds.
    ///
    /// No ordering is expected. A hit from a different plane is still added
    /// but marks the cluster as invalid.
    pub fn insert(&mut self, hit: Hit) {
        if self.hits.is_empty() {
            self.plane = Some(hit.plane);
            self.mixed_planes = false;
            self.coord_start = hit.coordinate;
            self.coord_end = hit.coordinate;
            self.time_start = hit.time;
            self.time_end = hit.time;
        } else {
            if self.plane != Some(hit.plane) {
                self.mixed_planes = true;
                self.plane = None;
            }
            self.coord_start = self.coord_start.min(hit.coordinate);
            self.coord_end = self.coord_end.max(hit.coordinate);
            self.time_start = self.time_start.min(hit.time);
            self.time_end = self.time_end.max(hit.time);
        }

        let weight = f64::from(hit.weight);
        self.weight_sum += weight;
        self.coord_mass += weight * f64::from(hit.coordinate);
        self.time_mass += weight * hit.time as f64;
        self.hits.push(hit);
    }

    /// Moves all hits of `other` into this cluster, leaving `other` empty.
    pub fn merge(&mut self, other: &mut Cluster) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = std::mem::take(other);
            return;
        }

        if self.plane != other.plane || other.mixed_planes {
            self.mixed_planes = true;
            self.plane = None;
        }
        self.hits.append(&mut other.hits);
        self.weight_sum += other.weight_sum;
        self.coord_mass += other.coord_mass;
        self.time_mass += other.time_mass;
        self.coord_start = self.coord_start.min(other.coord_start);
        self.coord_end = self.coord_end.max(other.coord_end);
        self.time_start = self.time_start.min(other.time_start);
        self.time_end = self.time_end.max(other.time_end);
        other.clear();
    }

    /// Removes all hits and resets the cached values.
    pub fn clear(&mut self) {
        self.hits.clear();
        self.plane = None;
        self.mixed_planes = false;
        self.coord_start = 0;
        self.coord_end = 0;
        self.time_start = 0;
        self.time_end = 0;
        self.weight_sum = 0.0;
        self.coord_mass = 0.0;
        self.time_mass = 0.0;
    }

    /// Returns the hits in insertion order.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Consumes the cluster, returning its hits.
    #[must_use]
    pub fn into_hits(self) -> Vec<Hit> {
        self.hits
    }

    /// Returns true if the cluster holds no hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Returns true if the cluster holds hits and all share one plane.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.hits.is_empty() && !self.mixed_planes
    }

    /// Plane shared by all hits, `None` if empty or mixed.
    #[must_use]
    pub fn plane(&self) -> Option<u8> {
        self.plane
    }

    /// Number of hits in the cluster.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// Lowest coordinate. Zero for an empty cluster.
    #[must_use]
    pub fn coord_start(&self) -> u16 {
        self.coord_start
    }

    /// Highest coordinate. Zero for an empty cluster.
    #[must_use]
    pub fn coord_end(&self) -> u16 {
        self.coord_end
    }

    /// Coordinate span including both endpoints, 0 when empty.
    #[must_use]
    pub fn coord_span(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        u32::from(self.coord_end - self.coord_start) + 1
    }

    /// Earliest hit time. Zero for an empty cluster.
    #[must_use]
    pub fn time_start(&self) -> u64 {
        self.time_start
    }

    /// Latest hit time. Zero for an empty cluster.
    #[must_use]
    pub fn time_end(&self) -> u64 {
        self.time_end
    }

    /// Time span including both endpoints, 0 when empty.
    #[must_use]
    pub fn time_span(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.time_end - self.time_start + 1
    }

    /// Sum of hit weights.
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    /// Sum of weight times coordinate.
    #[must_use]
    pub fn coord_mass(&self) -> f64 {
        self.coord_mass
    }

    /// Weighted mean coordinate. NaN if the weight sum is zero.
    #[must_use]
    pub fn coord_center(&self) -> f64 {
        self.coord_mass / self.weight_sum
    }

    /// Sum of weight times time.
    #[must_use]
    pub fn time_mass(&self) -> f64 {
        self.time_mass
    }

    /// Weighted mean time. NaN if the weight sum is zero.
    #[must_use]
    pub fn time_center(&self) -> f64 {
        self.time_mass / self.weight_sum
    }

    /// Overlapping time span with `other`, inclusive of endpoints.
    #[must_use]
    pub fn time_overlap(&self, other: &Cluster) -> u64 {
        if self.is_empty() || other.is_empty() {
            return 0;
        }
        span_overlap(
            (self.time_start, self.time_end),
            (other.time_start, other.time_end),
        )
    }

    /// Time between the end of the earlier and the start of the later cluster.
    ///
    /// Zero when the clusters overlap, `u64::MAX` when either is empty.
    #[must_use]
    pub fn time_gap(&self, other: &Cluster) -> u64 {
        if self.is_empty() || other.is_empty() {
            return u64::MAX;
        }
        span_gap(
            (self.time_start, self.time_end),
            (other.time_start, other.time_end),
        )
    }
}

impl FromIterator<Hit> for Cluster {
    fn from_iter<I: IntoIterator<Item = Hit>>(iter: I) -> Self {
        let mut cluster = Cluster::new();
        for hit in iter {
            cluster.insert(hit);
        }
        cluster
    }
}

/// Overlap of two closed intervals, counting both endpoints.
pub(crate) fn span_overlap(a: (u64, u64), b: (u64, u64)) -> u64 {
    let latest_start = a.0.max(b.0);
    let earliest_end = a.1.min(b.1);
    if latest_start > earliest_end {
        return 0;
    }
    earliest_end - latest_start + 1
}

/// Distance between two closed intervals, zero if they intersect.
pub(crate) fn span_gap(a: (u64, u64), b: (u64, u64)) -> u64 {
    let latest_start = a.0.max(b.0);
    let earliest_end = a.1.min(b.1);
    latest_start.saturating_sub(earliest_end)
}

/// Configuration for gap-based clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClustererConfig {
    /// Largest time difference between consecutive hits of one time-group.
    pub max_time_gap: u64,
    /// Largest coordinate difference between neighbouring hits of one cluster.
    pub max_coord_gap: u16,
}

impl Default for ClustererConfig {
    fn default() -> Self {
        Self {
            max_time_gap: 200,
            max_coord_gap: 2,
        }
    }
}

impl ClustererConfig {
    /// Creates a new clusterer configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum time gap.
    #[must_use]
    pub fn with_max_time_gap(mut self, gap: u64) -> Self {
        self.max_time_gap = gap;
        self
    }

    /// Sets the maximum coordinate gap.
    #[must_use]
    pub fn with_max_coord_gap(mut self, gap: u16) -> Self {
        self.max_coord_gap = gap;
        self
    }
}

/// Counters reported by a clusterer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusteringStatistics {
    /// Hits accepted by `insert`.
    pub hits_processed: usize,
    /// Clusters stashed into the output collection since construction.
    pub clusters_found: usize,
}

/// Trait for single-plane clustering algorithms.
///
/// Hits are fed one at a time in non-decreasing time order. Completed clusters
/// accumulate in an output collection that the caller drains with
/// [`HitClustering::take_clusters`].
pub trait HitClustering: Send {
    /// Returns the name of the algorithm.
    fn name(&self) -> &'static str;

    /// Accepts one hit. Hits must arrive in non-decreasing time order.
    fn insert(&mut self, hit: Hit);

    /// Inserts every hit of an already time-sorted sequence.
    fn cluster(&mut self, hits: &[Hit]) {
        for hit in hits {
            self.insert(*hit);
        }
    }

    /// Closes all open state, stashing what remains as clusters.
    fn flush(&mut self);

    /// Completed clusters not yet taken by the caller.
    fn clusters(&self) -> &[Cluster];

    /// Drains the completed clusters, transferring ownership to the caller.
    fn take_clusters(&mut self) -> Vec<Cluster>;

    /// Returns true if no hits are held in open state.
    fn is_empty(&self) -> bool;

    /// Returns cumulative counters.
    fn statistics(&self) -> ClusteringStatistics;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hit(time: u64, coordinate: u16, weight: u16) -> Hit {
        Hit::new(time, 0, coordinate, weight)
    }

    #[test]
    fn test_cluster_bounds() {
        let mut cluster = Cluster::with_capacity(4);
        assert!(cluster.is_empty());
        assert!(!cluster.is_valid());
        assert_eq!(cluster.time_span(), 0);
        assert_eq!(cluster.coord_span(), 0);

        cluster.insert(hit(10, 5, 1));
        cluster.insert(hit(4, 9, 1));
        cluster.insert(hit(7, 2, 1));

        assert_eq!(cluster.hit_count(), 3);
        assert_eq!(cluster.time_start(), 4);
        assert_eq!(cluster.time_end(), 10);
        assert_eq!(cluster.time_span(), 7);
        assert_eq!(cluster.coord_start(), 2);
        assert_eq!(cluster.coord_end(), 9);
        assert_eq!(cluster.coord_span(), 8);
        assert_eq!(cluster.plane(), Some(0));
        assert!(cluster.is_valid());
    }

    #[test]
    fn test_cluster_centers() {
        let mut cluster = Cluster::new();
        assert!(cluster.coord_center().is_nan());

        cluster.insert(hit(0, 10, 2));
        assert_relative_eq!(cluster.coord_mass(), 20.0);
        assert_relative_eq!(cluster.coord_center(), 10.0);

        cluster.insert(hit(5, 0, 8));
        assert_relative_eq!(cluster.coord_center(), 2.0);
        assert_relative_eq!(cluster.time_center(), 4.0);
    }

    #[test]
    fn test_zero_weight_center_is_nan() {
        let cluster: Cluster = [hit(0, 1, 0), hit(1, 2, 0)].into_iter().collect();
        assert!(cluster.coord_center().is_nan());
    }

    #[test]
    fn test_mixed_planes_invalidate() {
        let mut cluster = Cluster::new();
        cluster.insert(Hit::new(0, 0, 1, 1));
        cluster.insert(Hit::new(0, 1, 1, 1));
        assert!(!cluster.is_valid());
        assert_eq!(cluster.plane(), None);
        assert_eq!(cluster.hit_count(), 2);
    }

    #[test]
    fn test_merge_moves_hits() {
        let mut a: Cluster = [hit(0, 1, 1), hit(2, 3, 1)].into_iter().collect();
        let mut b: Cluster = [hit(5, 0, 1), hit(9, 7, 1)].into_iter().collect();
        a.merge(&mut b);

        assert!(b.is_empty());
        assert_eq!(a.hit_count(), 4);
        assert_eq!(a.time_start(), 0);
        assert_eq!(a.time_end(), 9);
        assert_eq!(a.coord_start(), 0);
        assert_eq!(a.coord_end(), 7);
        assert_relative_eq!(a.weight_sum(), 4.0);
        assert!(a.is_valid());
    }

    #[test]
    fn test_merge_into_empty() {
        let mut a = Cluster::new();
        let mut b: Cluster = [hit(5, 0, 1)].into_iter().collect();
        a.merge(&mut b);
        assert_eq!(a.hit_count(), 1);
        assert!(b.is_empty());
    }

    #[test]
    fn test_time_overlap() {
        let mut a = Cluster::new();
        let mut b = Cluster::new();
        assert_eq!(a.time_overlap(&b), 0);

        a.insert(hit(0, 0, 1));
        a.insert(hit(7, 0, 1));
        b.insert(hit(12, 0, 1));
        assert_eq!(a.time_overlap(&b), 0);

        b.insert(hit(6, 0, 1));
        assert_eq!(a.time_overlap(&b), 2);

        b.insert(hit(5, 0, 1));
        assert_eq!(a.time_overlap(&b), 3);
    }

    #[test]
    fn test_time_gap() {
        let a: Cluster = [hit(0, 0, 1), hit(5, 0, 1)].into_iter().collect();
        let b: Cluster = [hit(8, 0, 1), hit(9, 0, 1)].into_iter().collect();
        assert_eq!(a.time_gap(&b), 3);
        assert_eq!(b.time_gap(&a), 3);
        assert_eq!(a.time_gap(&a), 0);
        assert_eq!(a.time_gap(&Cluster::new()), u64::MAX);
    }

    #[test]
    fn test_clusterer_config() {
        let config = ClustererConfig::new()
            .with_max_time_gap(5)
            .with_max_coord_gap(3);
        assert_eq!(config.max_time_gap, 5);
        assert_eq!(config.max_coord_gap, 3);
    }
}
