//! Receive-path counters shared between the producer and consumer threads.

use std::sync::atomic::{AtomicU64, Ordering};

use evform_algorithms::FormationStatistics;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Live counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub struct RxStats {
    /// Datagrams handed to the consumer.
    pub rx_packets: AtomicU64,
    /// Bytes handed to the consumer.
    pub rx_bytes: AtomicU64,
    /// Receive timeouts without data.
    pub rx_idle: AtomicU64,
    /// Datagrams dropped on a full queue.
    pub fifo_push_errors: AtomicU64,
    /// Failed dump writes. The first one disables the dump.
    pub dump_errors: AtomicU64,
    /// Consumer polls of an empty queue.
    pub processing_idle: AtomicU64,
    /// Undecodable readout records.
    pub readout_errors: AtomicU64,
    pub hits: AtomicU64,
    pub clusters: AtomicU64,
    pub events: AtomicU64,
    pub good_events: AtomicU64,
    pub bad_events: AtomicU64,
}

/// Adds `n` to a counter.
pub(crate) fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl RxStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors the formation counters of the consumer's pipeline.
    pub fn record_formation(&self, formation: &FormationStatistics) {
        self.hits.store(formation.hits, Ordering::Relaxed);
        self.clusters.store(formation.clusters, Ordering::Relaxed);
        self.events.store(formation.events, Ordering::Relaxed);
        self.good_events.store(formation.good_events, Ordering::Relaxed);
        self.bad_events.store(formation.bad_events, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> RxStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RxStatsSnapshot {
            rx_packets: load(&self.rx_packets),
            rx_bytes: load(&self.rx_bytes),
            rx_idle: load(&self.rx_idle),
            fifo_push_errors: load(&self.fifo_push_errors),
            dump_errors: load(&self.dump_errors),
            processing_idle: load(&self.processing_idle),
            readout_errors: load(&self.readout_errors),
            hits: load(&self.hits),
            clusters: load(&self.clusters),
            events: load(&self.events),
            good_events: load(&self.good_events),
            bad_events: load(&self.bad_events),
        }
    }
}

/// Plain copy of [`RxStats`] for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[allow(missing_docs)]
pub struct RxStatsSnapshot {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub rx_idle: u64,
    pub fifo_push_errors: u64,
    pub dump_errors: u64,
    pub processing_idle: u64,
    pub readout_errors: u64,
    pub hits: u64,
    pub clusters: u64,
    pub events: u64,
    pub good_events: u64,
    pub bad_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = RxStats::new();
        bump(&stats.rx_packets, 2);
        bump(&stats.rx_bytes, 100);
        stats.record_formation(&FormationStatistics {
            hits: 10,
            events: 3,
            good_events: 2,
            bad_events: 1,
            ..FormationStatistics::default()
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.rx_packets, 2);
        assert_eq!(snapshot.rx_bytes, 100);
        assert_eq!(snapshot.hits, 10);
        assert_eq!(snapshot.good_events, 2);
        assert_eq!(snapshot.fifo_push_errors, 0);
    }
}
