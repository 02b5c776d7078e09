//! Combined configuration of the formation pipeline.

use crate::analysis::AnalyzerConfig;
use crate::clustering::ClustererConfig;
use crate::error::ConfigError;
use crate::matching::MatcherConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of the clusterers, the matcher and the analyzer.
///
/// Every tracked plane is clustered with the same `clusterer` settings.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormationConfig {
    pub clusterer: ClustererConfig,
    pub matcher: MatcherConfig,
    pub analyzer: AnalyzerConfig,
}

impl FormationConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clusterer configuration.
    #[must_use]
    pub fn with_clusterer(mut self, clusterer: ClustererConfig) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// Sets the matcher configuration.
    #[must_use]
    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = matcher;
        self
    }

    /// Sets the analyzer configuration.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Tracked planes, in output order.
    #[must_use]
    pub fn planes(&self) -> &[u8] {
        &self.matcher.planes
    }

    /// Validates the matcher and analyzer sections.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.matcher.validate()?;
        self.analyzer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = FormationConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.planes(), &[0, 1]);
    }

    #[test]
    fn test_invalid_section_reported() {
        let config =
            FormationConfig::new().with_analyzer(AnalyzerConfig::new().with_max_timebins(0));
        assert!(config.validate().is_err());

        let config = FormationConfig::new().with_matcher(MatcherConfig::new().with_planes(&[]));
        assert_eq!(config.validate(), Err(ConfigError::NoPlanes));
    }
}
