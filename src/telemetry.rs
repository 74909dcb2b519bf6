//! Per-worker timing telemetry
//!
//! Each worker owns one `WorkerTelemetry` and is its only writer. Other
//! threads read published clones, never the live value.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Default number of samples kept per step
pub const DEFAULT_STEP_WINDOW: usize = 100;

/// Default number of per-URL breakdowns kept
pub const DEFAULT_RECENT_TIMINGS: usize = 50;

/// A phase of processing one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Fetch,
    Parse,
    Extract,
    Save,
    AddLinks,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Fetch,
        Step::Parse,
        Step::Extract,
        Step::Save,
        Step::AddLinks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Extract => "extract",
            Self::Save => "save",
            Self::AddLinks => "add_links",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One duration measurement of one step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSample {
    pub duration_secs: f64,
    pub at: DateTime<Utc>,
    pub success: bool,
    pub url: String,
}

/// Aggregate over the samples currently in a step's window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepSummary {
    pub avg_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub count: usize,
}

/// Full timing breakdown of one processed URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlTiming {
    pub url: String,
    pub at: DateTime<Utc>,
    pub steps: BTreeMap<Step, f64>,
    pub total_secs: f64,
    pub error: Option<String>,
}

impl UrlTiming {
    pub fn new(url: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            at,
            steps: BTreeMap::new(),
            total_secs: 0.0,
            error: None,
        }
    }

    pub fn set_step(&mut self, step: Step, duration: Duration) {
        self.steps.insert(step, duration.as_secs_f64());
    }
}

/// Rolling step statistics and recent breakdowns for one worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerTelemetry {
    window: usize,
    recent_limit: usize,
    steps: BTreeMap<Step, VecDeque<StepSample>>,
    recent: VecDeque<UrlTiming>,
}

impl WorkerTelemetry {
    /// Creates an empty collector
    ///
    /// # Arguments
    ///
    /// * `window` - Samples kept per step (at least 1)
    /// * `recent_limit` - Per-URL breakdowns kept (at least 1)
    pub fn new(window: usize, recent_limit: usize) -> Self {
        Self {
            window: window.max(1),
            recent_limit: recent_limit.max(1),
            steps: BTreeMap::new(),
            recent: VecDeque::new(),
        }
    }

    /// Adds one sample, evicting the oldest once the window is full
    pub fn record_sample(&mut self, step: Step, sample: StepSample) {
        let ring = self
            .steps
            .entry(step)
            .or_insert_with(|| VecDeque::with_capacity(self.window));
        if ring.len() == self.window {
            ring.pop_front();
        }
        ring.push_back(sample);
    }

    /// Records the breakdown of one processed URL
    ///
    /// Every step in the breakdown also becomes a sample in that step's window.
    pub fn record(&mut self, timing: UrlTiming) {
        let success = timing.error.is_none();
        for (step, secs) in &timing.steps {
            self.record_sample(
                *step,
                StepSample {
                    duration_secs: *secs,
                    at: timing.at,
                    success,
                    url: timing.url.clone(),
                },
            );
        }

        if self.recent.len() == self.recent_limit {
            self.recent.pop_front();
        }
        self.recent.push_back(timing);
    }

    /// Samples currently held for `step`, oldest first
    pub fn samples(&self, step: Step) -> impl Iterator<Item = &StepSample> {
        self.steps.get(&step).into_iter().flatten()
    }

    /// Computes avg/min/max/count per step from the current windows
    pub fn summary(&self) -> BTreeMap<Step, StepSummary> {
        self.steps
            .iter()
            .filter_map(|(step, ring)| summarize(ring).map(|summary| (*step, summary)))
            .collect()
    }

    /// Recent per-URL breakdowns, newest first
    pub fn recent(&self) -> Vec<UrlTiming> {
        self.recent.iter().rev().cloned().collect()
    }
}

impl Default for WorkerTelemetry {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_WINDOW, DEFAULT_RECENT_TIMINGS)
    }
}

fn summarize(ring: &VecDeque<StepSample>) -> Option<StepSummary> {
    if ring.is_empty() {
        return None;
    }

    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for sample in ring {
        total += sample.duration_secs;
        min = min.min(sample.duration_secs);
        max = max.max(sample.duration_secs);
    }

    Some(StepSummary {
        avg_secs: total / ring.len() as f64,
        min_secs: min,
        max_secs: max,
        count: ring.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(secs: f64) -> StepSample {
        StepSample {
            duration_secs: secs,
            at: Utc::now(),
            success: true,
            url: "https://example.com/".to_string(),
        }
    }

    #[test]
    fn test_summary_on_read() {
        let mut telemetry = WorkerTelemetry::default();
        telemetry.record_sample(Step::Fetch, sample(1.0));
        telemetry.record_sample(Step::Fetch, sample(3.0));
        telemetry.record_sample(Step::Parse, sample(0.5));

        let summary = telemetry.summary();
        let fetch = summary[&Step::Fetch];
        assert_eq!(fetch.count, 2);
        assert_eq!(fetch.avg_secs, 2.0);
        assert_eq!(fetch.min_secs, 1.0);
        assert_eq!(fetch.max_secs, 3.0);
        assert_eq!(summary[&Step::Parse].count, 1);
        assert!(!summary.contains_key(&Step::Save));
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut telemetry = WorkerTelemetry::new(3, 10);
        for secs in [10.0, 1.0, 2.0, 3.0] {
            telemetry.record_sample(Step::Fetch, sample(secs));
        }

        let kept: Vec<f64> = telemetry
            .samples(Step::Fetch)
            .map(|s| s.duration_secs)
            .collect();
        assert_eq!(kept, vec![1.0, 2.0, 3.0]);

        // The evicted 10.0 no longer affects the maximum
        assert_eq!(telemetry.summary()[&Step::Fetch].max_secs, 3.0);
    }

    #[test]
    fn test_record_url_timing() {
        let mut telemetry = WorkerTelemetry::new(100, 2);

        for (i, error) in [None, Some("timeout"), None].into_iter().enumerate() {
            let mut timing = UrlTiming::new(format!("https://example.com/{}", i), Utc::now());
            timing.set_step(Step::Fetch, Duration::from_millis(200));
            timing.set_step(Step::AddLinks, Duration::from_millis(10));
            timing.total_secs = 0.21;
            timing.error = error.map(str::to_string);
            telemetry.record(timing);
        }

        let recent = telemetry.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].url, "https://example.com/2");
        assert_eq!(recent[1].error.as_deref(), Some("timeout"));

        assert_eq!(telemetry.summary()[&Step::Fetch].count, 3);
        let failed: Vec<bool> = telemetry
            .samples(Step::AddLinks)
            .map(|s| s.success)
            .collect();
        assert_eq!(failed, vec![true, false, true]);
    }

    #[test]
    fn test_step_names() {
        let names: Vec<&str> = Step::ALL.iter().map(Step::as_str).collect();
        assert_eq!(names, vec!["fetch", "parse", "extract", "save", "add_links"]);
    }
}
