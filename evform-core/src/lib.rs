//! evform-core: Core types for detector event formation.
//!
//! This crate provides the data model shared by the pipeline: hits, clusters,
//! cross-plane events and reduced events, together with the configuration
//! structs and the traits implemented by the algorithms crate.
//!

pub mod analysis;
pub mod clustering;
pub mod error;
pub mod event;
pub mod formation;
pub mod hit;
pub mod matching;
pub mod reduced;
pub mod trace;

pub use analysis::{AnalyzerConfig, EventReduction, Selection};
pub use clustering::{Cluster, ClustererConfig, ClusteringStatistics, HitClustering};
pub use error::{ConfigError, Error, Result};
pub use event::{Event, MAX_PLANES};
pub use formation::FormationConfig;
pub use hit::Hit;
pub use matching::{MatchPolicyConfig, MatcherConfig, TimeAlgorithm};
pub use reduced::{ReducedEvent, ReducedHit};
pub use trace::{Trace, Traces};
