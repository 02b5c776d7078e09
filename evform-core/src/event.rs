//! Cross-plane events assembled by a matcher.

use crate::clustering::{span_gap, span_overlap, Cluster};
use crate::hit::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of planes an event can pair (x, y, z).
pub const MAX_PLANES: usize = 3;

/// One cluster slot per tracked plane.
///
/// A slot holding an empty cluster means the plane is absent from the event.
/// Clusters merged into an occupied slot are appended to it.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    planes: Vec<u8>,
    clusters: Vec<Cluster>,
}

impl Event {
    /// Creates an empty event pairing the given planes, in output order.
    #[must_use]
    pub fn new(planes: &[u8]) -> Self {
        Self {
            planes: planes.to_vec(),
            clusters: vec![Cluster::new(); planes.len()],
        }
    }

    /// Planes tracked by this event, in output order.
    #[must_use]
    pub fn planes(&self) -> &[u8] {
        &self.planes
    }

    fn slot(&self, plane: u8) -> Option<usize> {
        self.planes.iter().position(|&p| p == plane)
    }

    /// Returns true if `plane` is one of the tracked planes.
    #[must_use]
    pub fn tracks(&self, plane: u8) -> bool {
        self.slot(plane).is_some()
    }

    /// Adds a single hit to the cluster of its plane.
    ///
    /// Returns false, leaving the event untouched, if the plane is not tracked.
    pub fn insert(&mut self, hit: Hit) -> bool {
        match self.slot(hit.plane) {
            Some(slot) => {
                self.clusters[slot].insert(hit);
                true
            }
            None => false,
        }
    }

    /// Moves `cluster` into the slot of its plane.
    ///
    /// Returns false, leaving `cluster` untouched, if its plane is not tracked
    /// or its hits span several planes.
    pub fn merge(&mut self, cluster: &mut Cluster) -> bool {
        let Some(slot) = cluster.plane().and_then(|plane| self.slot(plane)) else {
            return false;
        };
        self.clusters[slot].merge(cluster);
        true
    }

    /// Removes every cluster, keeping the tracked planes.
    pub fn clear(&mut self) {
        for cluster in &mut self.clusters {
            cluster.clear();
        }
    }

    /// Takes the non-empty clusters out of the event, leaving it empty.
    pub fn drain_clusters(&mut self) -> impl Iterator<Item = Cluster> + '_ {
        self.clusters
            .iter_mut()
            .map(std::mem::take)
            .filter(|cluster| !cluster.is_empty())
    }

    /// Cluster on `plane`, `None` if the plane is absent or untracked.
    #[must_use]
    pub fn cluster(&self, plane: u8) -> Option<&Cluster> {
        self.slot(plane)
            .map(|slot| &self.clusters[slot])
            .filter(|cluster| !cluster.is_empty())
    }

    /// All slots in output order, including empty ones.
    #[must_use]
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Iterates over populated planes and their clusters.
    pub fn populated(&self) -> impl Iterator<Item = (u8, &Cluster)> {
        self.planes
            .iter()
            .copied()
            .zip(self.clusters.iter())
            .filter(|(_, cluster)| !cluster.is_empty())
    }

    /// Returns true if no plane holds hits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.iter().all(Cluster::is_empty)
    }

    /// Returns true if every tracked plane holds hits.
    #[must_use]
    pub fn all_planes_populated(&self) -> bool {
        !self.clusters.is_empty() && self.clusters.iter().all(|c| !c.is_empty())
    }

    /// Number of hits across all planes.
    #[must_use]
    pub fn total_hit_count(&self) -> usize {
        self.clusters.iter().map(Cluster::hit_count).sum()
    }

    /// Earliest start time across populated planes, 0 when empty.
    #[must_use]
    pub fn time_start(&self) -> u64 {
        self.populated()
            .map(|(_, cluster)| cluster.time_start())
            .min()
            .unwrap_or(0)
    }

    /// Latest end time across populated planes, 0 when empty.
    #[must_use]
    pub fn time_end(&self) -> u64 {
        self.populated()
            .map(|(_, cluster)| cluster.time_end())
            .max()
            .unwrap_or(0)
    }

    /// Time span including both endpoints, 0 when empty.
    #[must_use]
    pub fn time_span(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.time_end() - self.time_start() + 1
    }

    /// Overlapping time span with `cluster`, inclusive of endpoints.
    #[must_use]
    pub fn time_overlap(&self, cluster: &Cluster) -> u64 {
        if self.is_empty() || cluster.is_empty() {
            return 0;
        }
        span_overlap(
            (self.time_start(), self.time_end()),
            (cluster.time_start(), cluster.time_end()),
        )
    }

    /// Time between event and cluster, zero if they overlap.
    ///
    /// `u64::MAX` when either side is empty.
    #[must_use]
    pub fn time_gap(&self, cluster: &Cluster) -> u64 {
        if self.is_empty() || cluster.is_empty() {
            return u64::MAX;
        }
        span_gap(
            (self.time_start(), self.time_end()),
            (cluster.time_start(), cluster.time_end()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(plane: u8, times: &[u64]) -> Cluster {
        times
            .iter()
            .map(|&time| Hit::new(time, plane, 1, 1))
            .collect()
    }

    #[test]
    fn test_empty_event() {
        let event = Event::new(&[0, 1]);
        assert!(event.is_empty());
        assert!(!event.all_planes_populated());
        assert_eq!(event.time_span(), 0);
        assert_eq!(event.cluster(0), None);
        assert_eq!(event.time_gap(&cluster(0, &[1])), u64::MAX);
    }

    #[test]
    fn test_insert_routes_by_plane() {
        let mut event = Event::new(&[0, 1]);
        assert!(event.insert(Hit::new(0, 0, 0, 1)));
        assert!(event.insert(Hit::new(1, 1, 0, 1)));
        assert!(!event.insert(Hit::new(1, 7, 0, 1)));

        assert_eq!(event.total_hit_count(), 2);
        assert!(event.all_planes_populated());
    }

    #[test]
    fn test_merge_appends_same_plane() {
        let mut event = Event::new(&[0, 1]);
        let mut a = cluster(0, &[0, 10]);
        let mut b = cluster(0, &[20, 30]);
        assert!(event.merge(&mut a));
        assert!(event.merge(&mut b));
        assert!(a.is_empty() && b.is_empty());

        assert_eq!(event.cluster(0).map(Cluster::hit_count), Some(4));
        assert_eq!(event.cluster(1), None);
        assert_eq!(event.time_span(), 31);
    }

    #[test]
    fn test_merge_rejects_untracked_plane() {
        let mut event = Event::new(&[3, 4]);
        let mut c = cluster(0, &[0]);
        assert!(!event.merge(&mut c));
        assert_eq!(c.hit_count(), 1);
        assert!(event.is_empty());
    }

    #[test]
    fn test_time_bounds_span_planes() {
        let mut event = Event::new(&[0, 1]);
        event.merge(&mut cluster(0, &[0, 200]));
        event.merge(&mut cluster(1, &[1, 300]));
        assert_eq!(event.time_start(), 0);
        assert_eq!(event.time_end(), 300);
        assert_eq!(event.time_span(), 301);

        assert_eq!(event.time_overlap(&cluster(0, &[300, 400])), 1);
        assert_eq!(event.time_gap(&cluster(0, &[305, 400])), 5);
    }

    #[test]
    fn test_drain_clusters() {
        let mut event = Event::new(&[0, 1, 2]);
        event.merge(&mut cluster(0, &[0]));
        event.merge(&mut cluster(2, &[5]));
        let drained: Vec<Cluster> = event.drain_clusters().collect();
        assert_eq!(drained.len(), 2);
        assert!(event.is_empty());
        assert_eq!(event.planes(), &[0, 1, 2]);
    }
}
