//! Streaming cross-plane matcher.
//!
//! Clusters from every tracked plane are queued in `time_end` order. A queued
//! cluster is only finalized once every tracked plane has progressed more than
//! `latency` past its end, so no earlier cluster can still arrive. Finalized
//! clusters are folded into events according to a [`MatchPolicy`].

use std::collections::VecDeque;

use evform_core::clustering::Cluster;
use evform_core::error::Result;
use evform_core::event::Event;
use evform_core::matching::MatcherConfig;
use evform_core::trace::{targets, Trace};
use log::Level;

use crate::policy::{MatchPolicy, Policy};

/// Matcher whose policy was chosen from a [`MatcherConfig`].
pub type ConfiguredMatcher = Matcher<Policy>;

/// Streaming matcher generic over its belonging policy.
#[derive(Debug)]
pub struct Matcher<P: MatchPolicy> {
    policy: P,
    planes: Vec<u8>,
    latency: u64,
    minimum_queued: usize,
    trace: Trace,
    /// Clusters not yet matched, sorted by `time_end` at the start of a match.
    unmatched: Vec<Cluster>,
    /// Highest `time_start` seen per tracked plane.
    latest: Vec<u64>,
    matched_events: Vec<Event>,
    stats_event_count: usize,
    stats_rejected_clusters: usize,
}

impl Matcher<Policy> {
    /// Creates a matcher with the policy named by `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &MatcherConfig) -> Result<Self> {
        Self::new(Policy::from(config.policy), config)
    }
}

impl<P: MatchPolicy> Matcher<P> {
    /// Creates a matcher with an explicit policy.
    ///
    /// The policy section of `config` is ignored.
    ///
    /// # Errors
    /// Returns an error if the tracked planes are invalid.
    pub fn new(policy: P, config: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            policy,
            planes: config.planes.clone(),
            latency: config.latency,
            minimum_queued: config.minimum_queued,
            trace: Trace::new(targets::MATCHER),
            unmatched: Vec::new(),
            latest: vec![0; config.planes.len()],
            matched_events: Vec::new(),
            stats_event_count: 0,
            stats_rejected_clusters: 0,
        })
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

    /// The belonging policy.
    #[must_use]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Tracked planes, in output order.
    #[must_use]
    pub fn planes(&self) -> &[u8] {
        &self.planes
    }

    /// Clusters waiting to be matched.
    #[must_use]
    pub fn unmatched(&self) -> &[Cluster] {
        &self.unmatched
    }

    /// Highest `time_start` seen on `plane`, `None` if the plane is untracked.
    #[must_use]
    pub fn latest(&self, plane: u8) -> Option<u64> {
        self.slot(plane).map(|slot| self.latest[slot])
    }

    /// Time up to which every tracked plane has progressed.
    #[must_use]
    pub fn horizon(&self) -> u64 {
        self.latest.iter().copied().min().unwrap_or(0)
    }

    /// Events closed but not yet taken.
    #[must_use]
    pub fn matched_events(&self) -> &[Event] {
        &self.matched_events
    }

    /// Drains the closed events.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.matched_events)
    }

    /// Events closed since construction.
    #[must_use]
    pub fn stats_event_count(&self) -> usize {
        self.stats_event_count
    }

    /// Clusters dropped because they were empty or not on a tracked plane.
    #[must_use]
    pub fn stats_rejected_clusters(&self) -> usize {
        self.stats_rejected_clusters
    }

    fn slot(&self, plane: u8) -> Option<usize> {
        self.planes.iter().position(|&p| p == plane)
    }

    /// Moves clusters of one plane into the unmatched queue.
    ///
    /// Clusters whose hits are not all on `plane` are rejected.
    pub fn insert(&mut self, plane: u8, clusters: Vec<Cluster>) {
        let Some(slot) = self.slot(plane) else {
            if !clusters.is_empty() && self.trace.enabled(Level::Debug) {
                log::debug!(
                    target: self.trace.target(),
                    "rejecting {} clusters from untracked plane {plane}",
                    clusters.len()
                );
            }
            self.stats_rejected_clusters += clusters.len();
            return;
        };

        for cluster in clusters {
            if cluster.plane() == Some(plane) {
                self.latest[slot] = self.latest[slot].max(cluster.time_start());
                self.unmatched.push(cluster);
            } else {
                self.stats_rejected_clusters += 1;
            }
        }
    }

    /// Moves one cluster into the unmatched queue, routed by its own plane.
    pub fn insert_cluster(&mut self, cluster: Cluster) {
        match cluster.plane() {
            Some(plane) => self.insert(plane, vec![cluster]),
            None => self.stats_rejected_clusters += 1,
        }
    }

    fn is_ready(&self, cluster: &Cluster, horizon: u64) -> bool {
        horizon.saturating_sub(cluster.time_end()) > self.latency
    }

    fn stash(&mut self, event: Event) {
        if self.trace.enabled(Level::Trace) {
            log::trace!(
                target: self.trace.target(),
                "stash event: time={}..{} hits={}",
                event.time_start(),
                event.time_end(),
                event.total_hit_count()
            );
        }
        self.matched_events.push(event);
        self.stats_event_count += 1;
    }

    /// Finds a queued cluster on the same plane as the front that belongs to
    /// `event` more closely than the front does.
    ///
    /// Returns its queue index. Ties keep the earlier cluster. The scan stops
    /// at the policy's reach, so its length does not grow with the queue.
    fn closer_candidate(
        &self,
        queue: &VecDeque<Cluster>,
        event: &Event,
        proximity: f64,
        horizon: Option<u64>,
        max_span: u64,
    ) -> Option<usize> {
        let front = queue.front()?;
        let limit = self.policy.reach(event, max_span);

        let mut best = None;
        let mut best_proximity = proximity;
        for (index, candidate) in queue.iter().enumerate().skip(1) {
            if candidate.time_end() > limit {
                break;
            }
            if horizon.is_some_and(|horizon| !self.is_ready(candidate, horizon)) {
                break;
            }
            if candidate.plane() != front.plane() {
                continue;
            }
            if let Some(p) = self.policy.proximity(event, candidate) {
                if p < best_proximity {
                    best = Some(index);
                    best_proximity = p;
                }
            }
        }
        best
    }

    /// Folds ready clusters into events.
    ///
    /// Without `flush`, matching stops at the first cluster that is not ready
    /// and the event still being accumulated is returned to the queue. With
    /// `flush`, every queued cluster is matched and the last event is closed.
    pub fn match_clusters(&mut self, flush: bool) {
        if self.unmatched.is_empty() {
            return;
        }
        if !flush && self.unmatched.len() < self.minimum_queued {
            return;
        }

        self.unmatched.sort_by_key(Cluster::time_end);
        let max_span = self
            .unmatched
            .iter()
            .map(Cluster::time_span)
            .max()
            .unwrap_or(0);
        let horizon = (!flush).then(|| self.horizon());
        let mut queue: VecDeque<Cluster> = std::mem::take(&mut self.unmatched).into();
        let mut event = Event::new(&self.planes);
        // Clusters passed over in favour of a closer one, excluded from `event`.
        let mut deferred: Vec<Cluster> = Vec::new();

        loop {
            let Some(front) = queue.front() else {
                if flush && !deferred.is_empty() {
                    self.stash(std::mem::replace(&mut event, Event::new(&self.planes)));
                    requeue_front(&mut queue, &mut deferred);
                    continue;
                }
                break;
            };
            if horizon.is_some_and(|horizon| !self.is_ready(front, horizon)) {
                break;
            }

            if !event.is_empty() {
                match self.policy.proximity(&event, front) {
                    None => {
                        self.stash(std::mem::replace(&mut event, Event::new(&self.planes)));
                        requeue_front(&mut queue, &mut deferred);
                        continue;
                    }
                    Some(proximity) => {
                        let plane_open = front
                            .plane()
                            .is_some_and(|plane| event.cluster(plane).is_none());
                        let closer = if plane_open {
                            self.closer_candidate(&queue, &event, proximity, horizon, max_span)
                        } else {
                            None
                        };
                        if let Some(index) = closer {
                            let passed = queue.remove(index);
                            if let Some(skipped) = queue.pop_front() {
                                deferred.push(skipped);
                            }
                            if let Some(mut closer) = passed {
                                event.merge(&mut closer);
                            }
                            continue;
                        }
                    }
                }
            }

            if let Some(mut next) = queue.pop_front() {
                if !event.merge(&mut next) {
                    self.stats_rejected_clusters += 1;
                }
            }
        }

        if !event.is_empty() {
            if flush {
                self.stash(event);
            } else {
                queue.extend(event.drain_clusters());
            }
        }
        queue.extend(deferred);
        self.unmatched = queue.into();
    }

    /// Matches every queued cluster regardless of readiness.
    ///
    /// A no-op when nothing is queued.
    pub fn flush(&mut self) {
        self.match_clusters(true);
    }
}

/// Puts deferred clusters back at the front of the queue, keeping it sorted.
fn requeue_front(queue: &mut VecDeque<Cluster>, deferred: &mut Vec<Cluster>) {
    for cluster in deferred.drain(..).rev() {
        queue.push_front(cluster);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CenterProximity, EndProximity, GapProximity, OverlapFraction};
    use evform_core::hit::Hit;
    use evform_core::matching::{MatchPolicyConfig, TimeAlgorithm};
    use std::cell::Cell;

    /// Overlap policy counting how often proximity is evaluated.
    #[derive(Debug)]
    struct CountingOverlap {
        inner: OverlapFraction,
        calls: Cell<usize>,
    }

    impl MatchPolicy for CountingOverlap {
        fn name(&self) -> &'static str {
            "CountingOverlap"
        }

        fn proximity(&self, event: &Event, cluster: &Cluster) -> Option<f64> {
            self.calls.set(self.calls.get() + 1);
            self.inner.proximity(event, cluster)
        }

        fn reach(&self, event: &Event, max_span: u64) -> u64 {
            self.inner.reach(event, max_span)
        }
    }

    fn single(plane: u8, time: u64) -> Cluster {
        std::iter::once(Hit::new(time, plane, 0, 1)).collect()
    }

    fn center_matcher() -> Matcher<CenterProximity> {
        let policy = CenterProximity::new(250, TimeAlgorithm::CenterOfMass);
        Matcher::new(policy, &MatcherConfig::new()).unwrap()
    }

    fn cluster(plane: u8, start: u64, end: u64) -> Cluster {
        [Hit::new(start, plane, 0, 1), Hit::new(end, plane, 0, 1)]
            .into_iter()
            .collect()
    }

    fn end_matcher(max_delta_time: u64, latency: u64) -> Matcher<EndProximity> {
        let config = MatcherConfig::new().with_latency(latency);
        Matcher::new(EndProximity::new(max_delta_time), &config).unwrap()
    }

    fn overlap_matcher(max_gap: u64) -> Matcher<OverlapFraction> {
        Matcher::new(OverlapFraction::new(0.0, max_gap), &MatcherConfig::new()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatcherConfig::new().with_planes(&[]);
        assert!(Matcher::from_config(&config).is_err());
    }

    #[test]
    fn test_insert_tracks_latest() {
        let mut matcher = end_matcher(10, 0);
        matcher.insert(0, vec![cluster(0, 0, 5), cluster(0, 10, 12)]);
        matcher.insert(1, vec![cluster(1, 3, 4)]);
        assert_eq!(matcher.unmatched().len(), 3);
        assert_eq!(matcher.latest(0), Some(10));
        assert_eq!(matcher.latest(1), Some(3));
        assert_eq!(matcher.latest(2), None);
        assert_eq!(matcher.horizon(), 3);
    }

    #[test]
    fn test_untracked_plane_rejected() {
        let mut matcher = end_matcher(10, 0);
        matcher.insert(2, vec![cluster(2, 0, 5), cluster(2, 6, 7)]);
        matcher.insert(0, vec![cluster(1, 0, 5)]);
        matcher.insert_cluster(cluster(5, 0, 1));
        assert!(matcher.unmatched().is_empty());
        assert_eq!(matcher.stats_rejected_clusters(), 4);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut matcher = end_matcher(10, 0);
        matcher.flush();
        matcher.flush();
        assert!(matcher.matched_events().is_empty());
        assert_eq!(matcher.stats_event_count(), 0);
    }

    #[test]
    fn test_end_just_inside() {
        let mut matcher = end_matcher(200, 0);
        matcher.insert(0, vec![cluster(0, 0, 200)]);
        matcher.insert(1, vec![cluster(1, 200, 400)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 1);
        assert!(matcher.matched_events()[0].all_planes_populated());
        assert!(matcher.unmatched().is_empty());
    }

    #[test]
    fn test_end_just_outside() {
        let mut matcher = end_matcher(200, 0);
        matcher.insert(0, vec![cluster(0, 0, 200)]);
        matcher.insert(1, vec![cluster(1, 200, 401)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 2);
    }

    #[test]
    fn test_overlap_just_inside() {
        let mut matcher = overlap_matcher(0);
        matcher.insert(0, vec![cluster(0, 0, 200)]);
        matcher.insert(1, vec![cluster(1, 200, 400)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 1);
    }

    #[test]
    fn test_overlap_just_outside() {
        let mut matcher = overlap_matcher(0);
        matcher.insert(0, vec![cluster(0, 0, 199)]);
        matcher.insert(1, vec![cluster(1, 200, 401)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 2);
    }

    #[test]
    fn test_overlap_gap_absorbs_second_plane() {
        let mut matcher = overlap_matcher(1);
        matcher.insert(0, vec![cluster(0, 0, 199)]);
        matcher.insert(1, vec![cluster(1, 200, 401)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 1);
    }

    #[test]
    fn test_not_ready_within_latency() {
        let mut matcher = end_matcher(200, 600);
        matcher.insert(0, vec![cluster(0, 0, 200), cluster(0, 700, 800)]);
        matcher.insert(1, vec![cluster(1, 0, 200), cluster(1, 700, 800)]);
        matcher.match_clusters(false);

        // Horizon 700 is not more than 600 past either end.
        assert!(matcher.matched_events().is_empty());
        assert_eq!(matcher.unmatched().len(), 4);
    }

    #[test]
    fn test_leftover_event_is_requeued() {
        let mut matcher = end_matcher(200, 600);
        matcher.insert(0, vec![cluster(0, 0, 200), cluster(0, 1000, 1200)]);
        matcher.insert(1, vec![cluster(1, 0, 200), cluster(1, 1000, 1200)]);
        matcher.match_clusters(false);

        // The first pair is ready but nothing after it proves the event closed.
        assert!(matcher.matched_events().is_empty());
        assert_eq!(matcher.unmatched().len(), 4);

        matcher.insert(0, vec![cluster(0, 2000, 2100)]);
        matcher.insert(1, vec![cluster(1, 2000, 2100)]);
        matcher.match_clusters(false);
        assert_eq!(matcher.stats_event_count(), 1);
        assert_eq!(matcher.matched_events()[0].total_hit_count(), 4);

        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 3);
        assert!(matcher.unmatched().is_empty());
    }

    #[test]
    fn test_minimum_queued_guard() {
        let config = MatcherConfig::new().with_minimum_queued(3);
        let mut sparse = Matcher::new(EndProximity::new(0), &config).unwrap();
        sparse.insert(0, vec![cluster(0, 0, 1)]);
        sparse.match_clusters(false);
        assert_eq!(sparse.unmatched().len(), 1);
        sparse.flush();
        assert_eq!(sparse.stats_event_count(), 1);
    }

    #[test]
    fn test_events_emitted_in_order() {
        let mut matcher = end_matcher(5, 0);
        let xs = (0..5).map(|i| cluster(0, i * 100, i * 100 + 2)).collect();
        let ys = (0..5).map(|i| cluster(1, i * 100 + 1, i * 100 + 3)).collect();
        matcher.insert(0, xs);
        matcher.insert(1, ys);
        matcher.flush();

        let events = matcher.take_events();
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert!(event.all_planes_populated());
            assert_eq!(event.time_start(), i as u64 * 100);
        }
        assert!(matcher.matched_events().is_empty());
    }

    #[test]
    fn test_closest_candidate_wins() {
        let mut matcher = overlap_matcher(0);
        matcher.insert(0, vec![cluster(0, 0, 100)]);
        matcher.insert(1, vec![cluster(1, 90, 105), cluster(1, 0, 110)]);
        matcher.flush();

        let events = matcher.take_events();
        assert_eq!(events.len(), 2);
        let paired = events[0].cluster(1).map(Cluster::time_start);
        assert_eq!(paired, Some(0));
        assert_eq!(events[1].cluster(1).map(Cluster::time_start), Some(90));
        assert!(events[1].cluster(0).is_none());
    }

    #[test]
    fn test_configured_matcher() {
        let config = MatcherConfig::new()
            .with_planes(&[1, 0])
            .with_policy(MatchPolicyConfig::End { max_delta_time: 5 });
        let mut matcher = Matcher::from_config(&config).unwrap();
        matcher.insert(0, vec![cluster(0, 0, 3)]);
        matcher.insert(1, vec![cluster(1, 0, 4)]);
        matcher.flush();
        assert_eq!(matcher.policy().name(), "EndProximity");
        assert_eq!(matcher.matched_events()[0].planes(), &[1, 0]);
    }

    #[test]
    fn test_overlap_scan_is_bounded() {
        let events = 20_000u64;
        let policy = CountingOverlap {
            inner: OverlapFraction::new(0.5, 100),
            calls: Cell::new(0),
        };
        let mut matcher = Matcher::new(policy, &MatcherConfig::new()).unwrap();
        let xs = (0..events).map(|i| cluster(0, i * 1000, i * 1000 + 10)).collect();
        let ys = (0..events)
            .map(|i| cluster(1, i * 1000 + 5, i * 1000 + 15))
            .collect();
        matcher.insert(0, xs);
        matcher.insert(1, ys);
        matcher.flush();

        assert_eq!(matcher.stats_event_count(), events as usize);
        assert!(matcher.matched_events().iter().all(Event::all_planes_populated));
        // A few evaluations per event, independent of the queue length.
        let calls = matcher.policy().calls.get();
        assert!(calls < 8 * events as usize, "{calls} proximity calls");
    }

    #[test]
    fn test_center_same_plane_splits() {
        let mut matcher = center_matcher();
        matcher.insert(0, vec![single(0, 100), single(0, 120)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 2);
    }

    #[test]
    fn test_center_pairs_then_splits() {
        let mut matcher = center_matcher();
        matcher.insert(0, vec![single(0, 100), single(0, 160)]);
        matcher.insert(1, vec![single(1, 150)]);
        matcher.flush();

        let events = matcher.take_events();
        assert_eq!(events.len(), 2);
        assert!(events[0].all_planes_populated());
        assert_eq!(events[0].cluster(1).map(Cluster::time_start), Some(150));
        assert_eq!(events[1].cluster(0).map(Cluster::time_start), Some(160));
        assert!(events[1].cluster(1).is_none());
    }

    #[test]
    fn test_center_large_delta() {
        let mut matcher = center_matcher();
        matcher.insert(0, vec![single(0, 100)]);
        matcher.insert(1, vec![single(1, 1000)]);
        matcher.flush();
        assert_eq!(matcher.stats_event_count(), 2);
    }

    #[test]
    fn test_center_alternating_planes() {
        let mut matcher = center_matcher();
        matcher.insert(0, vec![single(0, 100), single(0, 140)]);
        matcher.insert(1, vec![single(1, 150), single(1, 200)]);
        matcher.flush();

        let events = matcher.take_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].total_hit_count(), 1);
        assert!(events[1].all_planes_populated());
        assert_eq!(events[2].cluster(1).map(Cluster::time_start), Some(200));
    }

    #[test]
    fn test_gap_policy_appends_same_plane() {
        let mut matcher = Matcher::new(GapProximity::new(10), &MatcherConfig::new()).unwrap();
        matcher.insert(0, vec![cluster(0, 0, 5), cluster(0, 12, 20), cluster(0, 40, 45)]);
        matcher.insert(1, vec![cluster(1, 18, 25)]);
        matcher.flush();

        let events = matcher.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].cluster(0).map(Cluster::hit_count), Some(4));
        assert_eq!(events[0].time_end(), 25);
        assert_eq!(events[1].time_start(), 40);
    }

    #[test]
    fn test_configured_gap_and_center() {
        let config = MatcherConfig::new().with_policy(MatchPolicyConfig::Gap {
            minimum_time_gap: 3,
        });
        let matcher = Matcher::from_config(&config).unwrap();
        assert_eq!(matcher.policy().name(), "GapProximity");

        let config = config.with_policy(MatchPolicyConfig::Center {
            max_delta_time: 3,
            time_algorithm: TimeAlgorithm::Utpc,
        });
        let matcher = Matcher::from_config(&config).unwrap();
        assert_eq!(matcher.policy().name(), "CenterProximity");
    }
}
