//! evform-algorithms: Event formation algorithms.
//!
//! This crate provides the stages of the formation pipeline:
//! - **Gap clustering** - time-group then coordinate-gap splitting per plane
//! - **Matching** - streaming cross-plane fusion under a latency window
//! - **Analysis** - reduction of matched events to coordinates
//!
#![warn(missing_docs)]

mod analyzer;
mod gap;
mod matcher;
pub mod policy;
mod processing;

pub use analyzer::EventAnalyzer;
pub use gap::GapClusterer;
pub use matcher::{ConfiguredMatcher, Matcher};
pub use policy::{
    CenterProximity, EndProximity, GapProximity, MatchPolicy, OverlapFraction, Policy,
};
pub use processing::{form_events, EventBuilder, FormationStatistics};

// Re-export core traits
pub use evform_core::analysis::EventReduction;
pub use evform_core::clustering::{ClusteringStatistics, HitClustering};
