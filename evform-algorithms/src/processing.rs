//! High-level helpers that chain clustering, matching and reduction.

use evform_core::analysis::EventReduction;
use evform_core::clustering::{Cluster, HitClustering};
use evform_core::error::Result;
use evform_core::formation::FormationConfig;
use evform_core::hit::{sort_chronologically, Hit};
use evform_core::reduced::ReducedEvent;
use evform_core::trace::{Trace, Traces};
use log::Level;
use rayon::prelude::*;

use crate::{ConfiguredMatcher, EventAnalyzer, GapClusterer};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters reported by an [`EventBuilder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FormationStatistics {
    /// Hits accepted by a plane clusterer.
    pub hits: u64,
    /// Hits on planes that are not tracked.
    pub rejected_hits: u64,
    /// Clusters handed to the matcher.
    pub clusters: u64,
    /// Events reduced.
    pub events: u64,
    /// Reduced events with every dimension good.
    pub good_events: u64,
    /// Reduced events with at least one bad dimension.
    pub bad_events: u64,
}

impl FormationStatistics {
    fn count(&mut self, reduced: &[ReducedEvent]) {
        let good = reduced.iter().filter(|event| event.good).count() as u64;
        self.events += reduced.len() as u64;
        self.good_events += good;
        self.bad_events += reduced.len() as u64 - good;
    }
}

/// Streaming formation pipeline for one detector.
///
/// Hits are routed to one [`GapClusterer`] per tracked plane. Each call to
/// [`process`](Self::process) moves completed clusters into the matcher and
/// reduces the events it closes. [`flush`](Self::flush) closes everything.
#[derive(Debug)]
pub struct EventBuilder {
    clusterers: Vec<(u8, GapClusterer)>,
    matcher: ConfiguredMatcher,
    analyzer: EventAnalyzer,
    trace: Trace,
    stats: FormationStatistics,
}

impl EventBuilder {
    /// Creates a pipeline for the planes tracked by `config`, logging at
    /// every level.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &FormationConfig) -> Result<Self> {
        Self::with_traces(config, &Traces::default())
    }

    /// Creates a pipeline whose stages log through `traces`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn with_traces(config: &FormationConfig, traces: &Traces) -> Result<Self> {
        config.validate()?;
        let clusterers = config
            .planes()
            .iter()
            .map(|&plane| {
                let clusterer = GapClusterer::new(config.clusterer).with_trace(traces.clusterer);
                (plane, clusterer)
            })
            .collect();
        Ok(Self {
            clusterers,
            matcher: ConfiguredMatcher::from_config(&config.matcher)?.with_trace(traces.matcher),
            analyzer: EventAnalyzer::new(config.analyzer).with_trace(traces.analyzer),
            trace: traces.processing,
            stats: FormationStatistics::default(),
        })
    }

    /// Logging contexts of the stages, in the order clusterer, matcher,
    /// analyzer, pipeline.
    #[must_use]
    pub fn traces(&self) -> [Trace; 4] {
        let clusterer = self
            .clusterers
            .first()
            .map_or(self.trace, |(_, clusterer)| clusterer.trace());
        [
            clusterer,
            self.matcher.trace(),
            self.analyzer.trace(),
            self.trace,
        ]
    }

    /// Cumulative counters.
    #[must_use]
    pub fn statistics(&self) -> FormationStatistics {
        self.stats
    }

    /// The matcher, for inspecting its state and counters.
    #[must_use]
    pub fn matcher(&self) -> &ConfiguredMatcher {
        &self.matcher
    }

    /// Routes one hit to the clusterer of its plane.
    ///
    /// Returns false if the plane is not tracked.
    pub fn insert(&mut self, hit: Hit) -> bool {
        match self.clusterers.iter_mut().find(|(plane, _)| *plane == hit.plane) {
            Some((_, clusterer)) => {
                clusterer.insert(hit);
                self.stats.hits += 1;
                true
            }
            None => {
                self.stats.rejected_hits += 1;
                false
            }
        }
    }

    /// Inserts every hit, then processes.
    pub fn push_hits(&mut self, hits: &[Hit]) -> Vec<ReducedEvent> {
        for hit in hits {
            self.insert(*hit);
        }
        self.process()
    }

    fn move_clusters(&mut self) {
        for (plane, clusterer) in &mut self.clusterers {
            let clusters = clusterer.take_clusters();
            self.stats.clusters += clusters.len() as u64;
            self.matcher.insert(*plane, clusters);
        }
    }

    fn reduce(&mut self) -> Vec<ReducedEvent> {
        let reduced: Vec<ReducedEvent> = self
            .matcher
            .take_events()
            .iter()
            .map(|event| self.analyzer.analyze(event))
            .collect();
        self.stats.count(&reduced);
        reduced
    }

    /// Matches ready clusters and reduces the events closed so far.
    pub fn process(&mut self) -> Vec<ReducedEvent> {
        self.move_clusters();
        self.matcher.match_clusters(false);
        self.reduce()
    }

    /// Closes every open time-group, cluster and event.
    pub fn flush(&mut self) -> Vec<ReducedEvent> {
        for (_, clusterer) in &mut self.clusterers {
            clusterer.flush();
        }
        self.move_clusters();
        self.matcher.flush();
        let reduced = self.reduce();
        if self.trace.enabled(Level::Debug) {
            log::debug!(
                target: self.trace.target(),
                "flushed {} events, totals: {:?}",
                reduced.len(),
                self.stats
            );
        }
        reduced
    }
}

/// Clusters one plane's hits, sorting them chronologically first.
fn cluster_plane(plane_hits: &mut [Hit], config: &FormationConfig) -> Vec<Cluster> {
    sort_chronologically(plane_hits);
    let mut clusterer = GapClusterer::new(config.clusterer);
    clusterer.cluster(plane_hits);
    clusterer.flush();
    clusterer.take_clusters()
}

/// Forms and reduces every event in a complete hit collection.
///
/// Hits may arrive in any order. Planes are clustered in parallel, then all
/// clusters are matched with a flush.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn form_events(hits: &[Hit], config: &FormationConfig) -> Result<Vec<ReducedEvent>> {
    config.validate()?;
    let planes = config.planes();

    let mut per_plane: Vec<Vec<Hit>> = vec![Vec::new(); planes.len()];
    for hit in hits {
        if let Some(slot) = planes.iter().position(|&p| p == hit.plane) {
            per_plane[slot].push(*hit);
        }
    }

    let clusters: Vec<Vec<Cluster>> = per_plane
        .par_iter_mut()
        .map(|plane_hits| cluster_plane(plane_hits, config))
        .collect();

    let mut matcher = ConfiguredMatcher::from_config(&config.matcher)?;
    for (&plane, plane_clusters) in planes.iter().zip(clusters) {
        matcher.insert(plane, plane_clusters);
    }
    matcher.flush();

    let analyzer = EventAnalyzer::new(config.analyzer);
    Ok(matcher
        .take_events()
        .par_iter()
        .map(|event| analyzer.analyze(event))
        .collect())
}
