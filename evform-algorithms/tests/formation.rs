use approx::assert_relative_eq;
use evform_algorithms::{
    form_events, EndProximity, EventBuilder, GapClusterer, HitClustering, Matcher,
};
use evform_core::analysis::AnalyzerConfig;
use evform_core::clustering::{Cluster, ClustererConfig};
use evform_core::formation::FormationConfig;
use evform_core::hit::Hit;
use evform_core::matching::{MatchPolicyConfig, MatcherConfig};

fn scenario_config() -> FormationConfig {
    FormationConfig::new()
        .with_clusterer(
            ClustererConfig::new()
                .with_max_time_gap(5)
                .with_max_coord_gap(2),
        )
        .with_matcher(
            MatcherConfig::new()
                .with_latency(0)
                .with_policy(MatchPolicyConfig::End { max_delta_time: 5 }),
        )
        .with_analyzer(AnalyzerConfig::new().with_weighted(false))
}

fn scenario_hits() -> Vec<Hit> {
    vec![
        Hit::new(0, 0, 10, 5),
        Hit::new(1, 0, 11, 5),
        Hit::new(0, 1, 20, 5),
        Hit::new(1, 1, 21, 5),
    ]
}

/// Deterministic pseudo-random hits, time-sorted, on one plane.
fn noisy_plane(seed: u64, count: usize) -> Vec<Hit> {
    let mut state = seed;
    let mut time = 0u64;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            time += (state >> 60) * 3;
            let coordinate = ((state >> 32) % 64) as u16;
            let weight = ((state >> 16) % 100) as u16;
            Hit::new(time, 0, coordinate, weight)
        })
        .collect()
}

#[test]
fn test_two_plane_event_streaming() {
    let mut builder = EventBuilder::new(&scenario_config()).unwrap();
    let mut events = builder.push_hits(&scenario_hits());
    events.extend(builder.flush());

    assert_eq!(events.len(), 1);
    let event = events[0];
    assert!(event.good);
    assert_eq!(event.time, 0);
    assert_relative_eq!(event.x.unwrap().center, 10.5);
    assert_relative_eq!(event.y.unwrap().center, 20.5);
    assert_eq!(event.x.unwrap().hits_used, 2);
    assert!(event.z.is_none());
}

#[test]
fn test_two_plane_event_batch() {
    let events = form_events(&scenario_hits(), &scenario_config()).unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].good);
    assert_relative_eq!(events[0].x.unwrap().center, 10.5);
    assert_relative_eq!(events[0].y.unwrap().center, 20.5);
}

#[test]
fn test_clustering_is_deterministic() {
    let hits = noisy_plane(7, 500);
    let run = || {
        let mut clusterer = GapClusterer::new(ClustererConfig::new().with_max_time_gap(4));
        clusterer.cluster(&hits);
        clusterer.flush();
        clusterer.take_clusters()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_clustering_covers_every_hit() {
    let hits = noisy_plane(11, 500);
    let mut clusterer = GapClusterer::new(ClustererConfig::new().with_max_time_gap(4));
    clusterer.cluster(&hits);
    clusterer.flush();

    let mut clustered: Vec<Hit> = clusterer
        .take_clusters()
        .into_iter()
        .flat_map(Cluster::into_hits)
        .collect();
    let mut expected = hits.clone();
    let key = |h: &Hit| (h.time, h.coordinate, h.weight);
    clustered.sort_by_key(key);
    expected.sort_by_key(key);
    assert_eq!(clustered, expected);
}

#[test]
fn test_clusters_respect_gaps() {
    let config = ClustererConfig::new()
        .with_max_time_gap(4)
        .with_max_coord_gap(3);
    let hits = noisy_plane(23, 800);
    let mut clusterer = GapClusterer::new(config);
    clusterer.cluster(&hits);
    clusterer.flush();

    // Consecutive input hits further apart than the time gap.
    let boundaries: Vec<(u64, u64)> = hits
        .windows(2)
        .filter(|w| w[1].time - w[0].time > config.max_time_gap)
        .map(|w| (w[0].time, w[1].time))
        .collect();
    assert!(!boundaries.is_empty());

    for cluster in clusterer.clusters() {
        let mut coords: Vec<u16> = cluster.hits().iter().map(|h| h.coordinate).collect();
        coords.sort_unstable();
        assert!(coords.windows(2).all(|w| w[1] - w[0] <= config.max_coord_gap));

        for &(before, after) in &boundaries {
            assert!(!(cluster.time_start() <= before && cluster.time_end() >= after));
        }
    }
}

#[test]
fn test_matcher_never_finalizes_unready_clusters() {
    let latency = 50;
    let config = MatcherConfig::new()
        .with_latency(latency)
        .with_minimum_queued(1);
    let mut matcher = Matcher::new(EndProximity::new(10), &config).unwrap();

    for step in 0..40u64 {
        let start = step * 20;
        let x: Cluster = [Hit::new(start, 0, 1, 1), Hit::new(start + 5, 0, 2, 1)]
            .into_iter()
            .collect();
        let y: Cluster = [Hit::new(start + 2, 1, 1, 1), Hit::new(start + 6, 1, 2, 1)]
            .into_iter()
            .collect();
        matcher.insert(0, vec![x]);
        matcher.insert(1, vec![y]);
        matcher.match_clusters(false);

        let horizon = matcher.horizon();
        for event in matcher.take_events() {
            for (_, cluster) in event.populated() {
                assert!(horizon.saturating_sub(cluster.time_end()) > latency);
            }
        }
    }
    matcher.flush();
    assert!(matcher.unmatched().is_empty());
    assert_eq!(matcher.stats_event_count(), 40);
}
