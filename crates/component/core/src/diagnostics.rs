//! Diagnostics sinks used while instantiating components and running handlers.
//!
//! Diagnostics are fire-and-forget: nothing here participates in control flow.
//! Log lines go through `tracing`; user-visible notices and profiling go
//! through the [`Notifier`] and [`Profiler`] traits so hosts can plug in their
//! own HUD or profiler.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::Level;

use crate::source::SourceHandle;

/// How long user-visible error notices stay on screen by default.
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(10);

/// Displays short user-visible notices (e.g. a HUD message).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, duration: Duration, level: Level);
}

/// Receives timing for profiled handler invocations.
pub trait Profiler: Send + Sync {
    fn record(&self, source: &SourceHandle, label: &str, elapsed: Duration);
}

/// Notifier that writes notices to the log instead of a screen.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, duration: Duration, level: Level) {
        let duration_ms = duration.as_millis() as u64;
        if level <= Level::WARN {
            tracing::warn!(target: "component::notice", duration_ms, %level, "{}", message);
        } else {
            tracing::info!(target: "component::notice", duration_ms, %level, "{}", message);
        }
    }
}

/// Profiler that drops every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn record(&self, _source: &SourceHandle, _label: &str, _elapsed: Duration) {}
}

/// Aggregated timing for one profiled label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub invocations: u64,
    pub total: Duration,
    pub worst: Duration,
}

impl ProfileStats {
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.invocations) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => self.total.div_f64(self.invocations as f64),
        }
    }
}

/// One row of a [`ProfileRecorder`] report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub source: String,
    pub label: String,
    pub stats: ProfileStats,
}

/// In-memory profiler aggregating invocations per source and label.
#[derive(Debug, Default)]
pub struct ProfileRecorder {
    results: Mutex<BTreeMap<(String, String), ProfileStats>>,
}

impl ProfileRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every label, sorted by source then label.
    pub fn report(&self) -> Vec<ProfileRow> {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .iter()
            .map(|((source, label), stats)| ProfileRow {
                source: source.clone(),
                label: label.clone(),
                stats: stats.clone(),
            })
            .collect()
    }

    /// Sum of all time spent in profiled handlers of `source`.
    pub fn total_for(&self, source: &str) -> Duration {
        let results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        results
            .iter()
            .filter(|((s, _), _)| s == source)
            .map(|(_, stats)| stats.total)
            .sum()
    }
}

impl Profiler for ProfileRecorder {
    fn record(&self, source: &SourceHandle, label: &str, elapsed: Duration) {
        let mut results = self.results.lock().unwrap_or_else(PoisonError::into_inner);
        let stats = results
            .entry((source.name().to_owned(), label.to_owned()))
            .or_default();
        stats.invocations += 1;
        stats.total += elapsed;
        stats.worst = stats.worst.max(elapsed);
    }
}

/// Bundle of diagnostics sinks handed to stores and actions.
///
/// Cloning is cheap; all clones share the same sinks.
#[derive(Clone)]
pub struct Diagnostics {
    notifier: Arc<dyn Notifier>,
    profiler: Arc<dyn Profiler>,
    notice_duration: Duration,
}

impl Diagnostics {
    pub fn new(notifier: Arc<dyn Notifier>, profiler: Arc<dyn Profiler>) -> Self {
        Self {
            notifier,
            profiler,
            notice_duration: DEFAULT_NOTICE_DURATION,
        }
    }

    #[must_use]
    pub fn with_notice_duration(mut self, duration: Duration) -> Self {
        self.notice_duration = duration;
        self
    }

    /// Shows an error notice if `source` opted into debug mode.
    pub fn notify_error(&self, source: &SourceHandle, message: &str) {
        if source.is_debug() {
            self.notifier
                .notify(message, self.notice_duration, Level::ERROR);
        }
    }

    pub fn profiler(&self) -> &dyn Profiler {
        self.profiler.as_ref()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier), Arc::new(NoopProfiler))
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("notice_duration", &self.notice_duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collecting(Mutex<Vec<String>>);

    impl Notifier for Collecting {
        fn notify(&self, message: &str, _duration: Duration, _level: Level) {
            self.0.lock().unwrap().push(message.to_owned());
        }
    }

    #[test]
    fn test_notices_only_for_debug_sources() {
        let notifier = Arc::new(Collecting::default());
        let diagnostics = Diagnostics::new(notifier.clone(), Arc::new(NoopProfiler));

        diagnostics.notify_error(&SourceHandle::new("quiet"), "hidden");
        diagnostics.notify_error(&SourceHandle::new("loud").with_debug(true), "shown");

        assert_eq!(*notifier.0.lock().unwrap(), vec!["shown".to_owned()]);
    }

    #[test]
    fn test_recorder_aggregates() {
        let recorder = ProfileRecorder::new();
        let source = SourceHandle::new("mod");

        recorder.record(&source, "radar.update", Duration::from_millis(2));
        recorder.record(&source, "radar.update", Duration::from_millis(6));
        recorder.record(&source, "radar.close", Duration::from_millis(1));

        let report = recorder.report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[1].label, "radar.update");
        assert_eq!(report[1].stats.invocations, 2);
        assert_eq!(report[1].stats.worst, Duration::from_millis(6));
        assert_eq!(report[1].stats.mean(), Duration::from_millis(4));
        assert_eq!(recorder.total_for("mod"), Duration::from_millis(9));
    }

    #[test]
    fn test_mean_survives_huge_counts() {
        let stats = ProfileStats {
            invocations: 1 << 32,
            total: Duration::from_secs(1 << 32),
            worst: Duration::from_secs(2),
        };
        assert_eq!(stats.mean(), Duration::from_secs(1));
        assert_eq!(ProfileStats::default().mean(), Duration::ZERO);
    }
}
