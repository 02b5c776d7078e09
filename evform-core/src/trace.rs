//! Per-component logging context.
//!
//! Each pipeline component owns a [`Trace`] naming its log target and the most
//! verbose level it emits. The global `log` filter still applies on top.

use log::{Level, LevelFilter};

/// Log targets of the pipeline components.
pub mod targets {
    pub const CLUSTERER: &str = "evform::clusterer";
    pub const MATCHER: &str = "evform::matcher";
    pub const ANALYZER: &str = "evform::analyzer";
    pub const RECEIVER: &str = "evform::receiver";
    pub const PROCESSING: &str = "evform::processing";
    pub const DUMP: &str = "evform::dump";
}

/// Logging context of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trace {
    target: &'static str,
    max_level: LevelFilter,
}

impl Trace {
    /// Context logging to `target` at every level.
    #[must_use]
    pub const fn new(target: &'static str) -> Self {
        Self {
            target,
            max_level: LevelFilter::Trace,
        }
    }

    /// Caps the emitted level.
    #[must_use]
    pub const fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        self.max_level = max_level;
        self
    }

    /// Log target.
    #[must_use]
    pub const fn target(&self) -> &'static str {
        self.target
    }

    /// Most verbose level emitted.
    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Returns true if a record at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level && log::log_enabled!(target: self.target, level)
    }
}

/// Logging contexts of every pipeline component.
///
/// Built once, usually from command-line verbosity, and handed to the
/// components at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traces {
    pub clusterer: Trace,
    pub matcher: Trace,
    pub analyzer: Trace,
    pub receiver: Trace,
    pub processing: Trace,
    pub dump: Trace,
}

impl Default for Traces {
    fn default() -> Self {
        Self {
            clusterer: Trace::new(targets::CLUSTERER),
            matcher: Trace::new(targets::MATCHER),
            analyzer: Trace::new(targets::ANALYZER),
            receiver: Trace::new(targets::RECEIVER),
            processing: Trace::new(targets::PROCESSING),
            dump: Trace::new(targets::DUMP),
        }
    }
}

impl Traces {
    /// Contexts logging at every level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every context, in pipeline order.
    #[must_use]
    pub fn all(&self) -> [Trace; 6] {
        [
            self.clusterer,
            self.matcher,
            self.analyzer,
            self.receiver,
            self.processing,
            self.dump,
        ]
    }

    fn each_mut(&mut self) -> [&mut Trace; 6] {
        [
            &mut self.clusterer,
            &mut self.matcher,
            &mut self.analyzer,
            &mut self.receiver,
            &mut self.processing,
            &mut self.dump,
        ]
    }

    /// Caps the level of every component.
    #[must_use]
    pub fn with_max_level(mut self, max_level: LevelFilter) -> Self {
        for trace in self.each_mut() {
            *trace = trace.with_max_level(max_level);
        }
        self
    }

    /// Caps the level of the component logging to `target`.
    ///
    /// Returns `None` if no component uses `target`. Short names such as
    /// `matcher` are accepted for `evform::matcher`.
    #[must_use]
    pub fn with_component_level(mut self, target: &str, max_level: LevelFilter) -> Option<Self> {
        let trace = self.each_mut().into_iter().find(|trace| {
            trace.target() == target || trace.target().strip_prefix("evform::") == Some(target)
        })?;
        *trace = trace.with_max_level(max_level);
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_cap() {
        let trace = Trace::new(targets::MATCHER).with_max_level(LevelFilter::Warn);
        assert_eq!(trace.target(), "evform::matcher");
        assert_eq!(trace.max_level(), LevelFilter::Warn);
        // No logger is installed in unit tests, so nothing is enabled.
        assert!(!trace.enabled(Level::Debug));
        let off = trace.with_max_level(LevelFilter::Off);
        assert!(!off.enabled(Level::Error));
    }


    #[test]
    fn test_traces_levels() {
        let traces = Traces::new().with_max_level(LevelFilter::Info);
        assert_eq!(traces.matcher.max_level(), LevelFilter::Info);
        assert_eq!(traces.dump.target(), targets::DUMP);

        let traces = traces
            .with_component_level("matcher", LevelFilter::Off)
            .unwrap()
            .with_component_level(targets::RECEIVER, LevelFilter::Trace)
            .unwrap();
        assert_eq!(traces.matcher.max_level(), LevelFilter::Off);
        assert_eq!(traces.receiver.max_level(), LevelFilter::Trace);
        assert_eq!(traces.analyzer.max_level(), LevelFilter::Info);
        assert!(traces.with_component_level("gui", LevelFilter::Off).is_none());
        assert_eq!(traces.all()[1], traces.matcher);
    }
}
