//! Gap-based single-plane clustering.
//!
//! Hits are first split into time-groups wherever consecutive hits are more
//! than `max_time_gap` apart. When a time-group closes it is sorted by
//! coordinate and split wherever neighbouring coordinates are more than
//! `max_coord_gap` apart.
//!
//! Hits must arrive in non-decreasing time order. This is not checked; hits
//! arriving out of order never open a new time-group on their own.

use evform_core::clustering::{Cluster, ClustererConfig, ClusteringStatistics, HitClustering};
use evform_core::hit::{sort_by_coordinate, Hit};
use evform_core::trace::{targets, Trace};
use log::Level;

/// Streaming gap clusterer for one plane.
#[derive(Debug, Clone)]
pub struct GapClusterer {
    config: ClustererConfig,
    trace: Trace,
    /// Open time-group, in arrival order.
    time_group: Vec<Hit>,
    /// Completed clusters not yet taken.
    clusters: Vec<Cluster>,
    hits_processed: usize,
    stats_cluster_count: usize,
}

impl GapClusterer {
    /// Creates a clusterer with the given gaps.
    #[must_use]
    pub fn new(config: ClustererConfig) -> Self {
        Self {
            config,
            trace: Trace::new(targets::CLUSTERER),
            time_group: Vec::new(),
            clusters: Vec::new(),
            hits_processed: 0,
            stats_cluster_count: 0,
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

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ClustererConfig {
        &self.config
    }

    /// Clusters stashed since construction.
    #[must_use]
    pub fn stats_cluster_count(&self) -> usize {
        self.stats_cluster_count
    }

    /// Hits in the open time-group.
    #[must_use]
    pub fn pending_hits(&self) -> usize {
        self.time_group.len()
    }

    fn stash(&mut self, cluster: Cluster) {
        if self.trace.enabled(Level::Trace) {
            log::trace!(
                target: self.trace.target(),
                "stash cluster: hits={} coord={}..{} time={}..{}",
                cluster.hit_count(),
                cluster.coord_start(),
                cluster.coord_end(),
                cluster.time_start(),
                cluster.time_end()
            );
        }
        self.clusters.push(cluster);
        self.stats_cluster_count += 1;
    }

    /// Splits the open time-group on coordinate gaps.
    fn close_time_group(&mut self) {
        if self.time_group.is_empty() {
            return;
        }
        let mut group = std::mem::take(&mut self.time_group);
        sort_by_coordinate(&mut group);

        let mut cluster = Cluster::new();
        for hit in group.drain(..) {
            if !cluster.is_empty()
                && hit.coordinate.saturating_sub(cluster.coord_end()) > self.config.max_coord_gap
            {
                self.stash(std::mem::take(&mut cluster));
            }
            cluster.insert(hit);
        }
        if !cluster.is_empty() {
            self.stash(cluster);
        }

        // Keep the allocation for the next group.
        self.time_group = group;
    }
}

impl Default for GapClusterer {
    fn default() -> Self {
        Self::new(ClustererConfig::default())
    }
}

impl HitClustering for GapClusterer {
    fn name(&self) -> &'static str {
        "Gap"
    }

    fn insert(&mut self, hit: Hit) {
        if let Some(last) = self.time_group.last() {
            if hit.time.saturating_sub(last.time) > self.config.max_time_gap {
                self.close_time_group();
            }
        }
        self.time_group.push(hit);
        self.hits_processed += 1;
    }

    fn flush(&mut self) {
        self.close_time_group();
    }

    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn take_clusters(&mut self) -> Vec<Cluster> {
        std::mem::take(&mut self.clusters)
    }

    fn is_empty(&self) -> bool {
        self.time_group.is_empty()
    }

    fn statistics(&self) -> ClusteringStatistics {
        ClusteringStatistics {
            hits_processed: self.hits_processed,
            clusters_found: self.stats_cluster_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusterer(max_time_gap: u64, max_coord_gap: u16) -> GapClusterer {
        GapClusterer::new(
            ClustererConfig::new()
                .with_max_time_gap(max_time_gap)
                .with_max_coord_gap(max_coord_gap),
        )
    }

    #[test]
    fn test_single_hit() {
        let mut gc = clusterer(1, 1);
        gc.insert(Hit::new(0, 0, 5, 1));
        assert!(gc.clusters().is_empty());
        assert!(!gc.is_empty());

        gc.flush();
        assert_eq!(gc.clusters().len(), 1);
        assert_eq!(gc.clusters()[0].hit_count(), 1);
        assert!(gc.is_empty());
    }

    #[test]
    fn test_time_gap_splits() {
        let hits: Vec<Hit> = (1..=10).map(|t| Hit::new(t, 0, 0, 1)).collect();
        let mut gc = clusterer(0, 1);
        gc.cluster(&hits);
        assert_eq!(gc.clusters().len(), 9);
        assert_eq!(gc.stats_cluster_count(), 9);

        gc.flush();
        assert_eq!(gc.clusters().len(), 10);
        assert_eq!(gc.statistics().hits_processed, 10);
    }

    #[test]
    fn test_time_gap_inclusive() {
        let mut gc = clusterer(5, 1);
        gc.cluster(&[
            Hit::new(0, 0, 0, 1),
            Hit::new(5, 0, 0, 1),
            Hit::new(11, 0, 0, 1),
        ]);
        gc.flush();
        let sizes: Vec<usize> = gc.clusters().iter().map(Cluster::hit_count).collect();
        assert_eq!(sizes, vec![2, 1]);
    }

    #[test]
    fn test_coordinate_gap_splits() {
        let mut gc = clusterer(100, 2);
        gc.cluster(&[
            Hit::new(0, 0, 10, 1),
            Hit::new(1, 0, 20, 1),
            Hit::new(2, 0, 12, 1),
            Hit::new(3, 0, 22, 1),
            Hit::new(4, 0, 30, 1),
        ]);
        gc.flush();

        let bounds: Vec<(u16, u16)> = gc
            .clusters()
            .iter()
            .map(|c| (c.coord_start(), c.coord_end()))
            .collect();
        assert_eq!(bounds, vec![(10, 12), (20, 22), (30, 30)]);
    }

    #[test]
    fn test_equal_coordinates_keep_arrival_order() {
        let mut gc = clusterer(100, 0);
        gc.cluster(&[
            Hit::new(0, 0, 3, 1),
            Hit::new(1, 0, 1, 2),
            Hit::new(2, 0, 3, 3),
        ]);
        gc.flush();

        let clusters = gc.take_clusters();
        assert_eq!(clusters.len(), 2);
        let weights: Vec<u16> = clusters[1].hits().iter().map(|h| h.weight).collect();
        assert_eq!(weights, vec![1, 3]);
        assert!(gc.clusters().is_empty());
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut gc = GapClusterer::default();
        gc.flush();
        gc.flush();
        assert!(gc.clusters().is_empty());
        assert_eq!(gc.stats_cluster_count(), 0);
        assert_eq!(gc.name(), "Gap");
    }
}
