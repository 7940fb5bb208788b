//! Scenario segmentation.
//!
//! Splits an ordered event stream into [`ScenarioRun`]s. A run opens when an
//! event names a scenario different from the open one and closes when the
//! next scenario begins or the stream ends, so `[A, A, B, A]` yields three
//! runs. Events that name no scenario attach to the open run; events seen
//! before any run opens are returned as leading orphans.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use simverdict_types::{FieldValue, Level, LogEvent, Timestamp, Verdict};
use tracing::debug;

use crate::config::AnalyzerConfig;
use crate::metrics::OperationTable;
use crate::scenario;
use crate::threshold::{ThresholdCheck, fold_checks};

/// First lines of an ERROR or WARN event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExcerpt {
    pub timestamp: Option<Timestamp>,
    pub target: String,
    pub message: String,
}

impl LogExcerpt {
    fn of(event: &LogEvent) -> Self {
        Self {
            timestamp: event.timestamp.clone(),
            target: event.target.clone(),
            message: event.message.clone(),
        }
    }
}

/// One assertion outcome logged by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub message: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<FieldValue>,
}

/// One execution of a named scenario.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub name: String,
    /// Input file the run started in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub duration_ms: Option<f64>,
    pub event_count: u64,
    /// Raw accumulators; the report carries derived statistics instead.
    #[serde(skip)]
    pub operations: OperationTable,
    /// Numeric fields captured from completion events.
    pub scenario_metrics: BTreeMap<String, f64>,
    pub assertions: Vec<Assertion>,
    pub error_count: u64,
    pub warning_count: u64,
    pub errors: Vec<LogExcerpt>,
    pub warnings: Vec<LogExcerpt>,
    pub event_counts: BTreeMap<String, u64>,
    pub trace_ids: BTreeSet<String>,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
}

impl ScenarioRun {
    #[must_use]
    pub fn new(name: impl Into<String>, source_file: Option<String>) -> Self {
        Self {
            name: name.into(),
            source_file,
            ..Self::default()
        }
    }

    /// Record one attributed event.
    pub fn observe(&mut self, event: &LogEvent, config: &AnalyzerConfig) {
        self.event_count += 1;
        if let Some(ts) = &event.timestamp {
            widen(&mut self.start_time, &mut self.end_time, ts);
        }
        if let Some(trace_id) = event.trace_id() {
            self.trace_ids.insert(trace_id);
        }
        if let Some(kind) = event
            .field("event_type")
            .or_else(|| event.field("event"))
            .map(FieldValue::to_text)
            .filter(|kind| !kind.is_empty())
        {
            *self.event_counts.entry(kind).or_default() += 1;
        }

        match event.level {
            Level::Error => {
                self.error_count += 1;
                if self.errors.len() < config.excerpt_limit {
                    self.errors.push(LogExcerpt::of(event));
                }
            }
            Level::Warn => {
                self.warning_count += 1;
                if self.warnings.len() < config.excerpt_limit {
                    self.warnings.push(LogExcerpt::of(event));
                }
            }
            Level::Info | Level::Unknown => {}
        }

        if is_completion(event) {
            self.capture_completion(event);
        }
        if is_assertion(event) {
            self.record_assertion(event);
        }
        self.operations
            .record_event(event, config.synthesized_sample_cap);
    }

    fn capture_completion(&mut self, event: &LogEvent) {
        for (key, value) in &event.fields {
            if let (true, Some(number)) = (value.is_numeric(), value.as_f64()) {
                self.scenario_metrics.insert(key.clone(), number);
            }
        }
        let duration = event
            .field("duration_ms")
            .or_else(|| event.field("duration"))
            .and_then(FieldValue::as_f64)
            .filter(|&ms| ms != 0.0);
        if duration.is_some() {
            self.duration_ms = duration;
        }
    }

    fn record_assertion(&mut self, event: &LogEvent) {
        let passed = event.message_contains("passed")
            || matches!(event.field("passed"), Some(FieldValue::Bool(true)));
        self.assertions.push(Assertion {
            message: event.message.clone(),
            passed,
            expected: event.field("expected").cloned(),
            actual: event.field("actual").cloned(),
        });
        self.verdict.record(passed);
    }

    /// Attach threshold checks and fold them into the verdict.
    pub fn apply_checks(&mut self, checks: Vec<ThresholdCheck>) {
        fold_checks(&mut self.verdict, &checks);
        self.checks.extend(checks);
    }

    /// Continue this run with a later segment of the same run.
    pub fn absorb(&mut self, later: Self, excerpt_limit: usize) {
        if let Some(ts) = &later.start_time {
            widen(&mut self.start_time, &mut self.end_time, ts);
        }
        if let Some(ts) = &later.end_time {
            widen(&mut self.start_time, &mut self.end_time, ts);
        }
        if later.duration_ms.is_some() {
            self.duration_ms = later.duration_ms;
        }
        self.event_count += later.event_count;
        self.operations.merge(&later.operations);
        self.scenario_metrics.extend(later.scenario_metrics);
        self.assertions.extend(later.assertions);
        self.error_count += later.error_count;
        self.warning_count += later.warning_count;
        self.errors.extend(later.errors);
        self.errors.truncate(excerpt_limit);
        self.warnings.extend(later.warnings);
        self.warnings.truncate(excerpt_limit);
        for (kind, count) in later.event_counts {
            *self.event_counts.entry(kind).or_default() += count;
        }
        self.trace_ids.extend(later.trace_ids);
        self.checks.extend(later.checks);
        self.verdict = self.verdict.combine(later.verdict);
    }
}

fn widen(start: &mut Option<Timestamp>, end: &mut Option<Timestamp>, ts: &Timestamp) {
    if start.as_ref().is_none_or(|current| ts < current) {
        *start = Some(ts.clone());
    }
    if end.as_ref().is_none_or(|current| ts > current) {
        *end = Some(ts.clone());
    }
}

fn is_completion(event: &LogEvent) -> bool {
    event.message_contains("completed") || event.field_str("status") == Some("completed")
}

fn is_assertion(event: &LogEvent) -> bool {
    event.message_contains("assertion") || event.field("assertion").is_some_and(FieldValue::is_truthy)
}

// ---------------------------------------------------------------------------
// Segmenter
// ---------------------------------------------------------------------------

/// Where one event ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    /// The event opened a new run.
    Opened,
    /// The event joined the open run.
    Joined,
    /// No run was open and the event named no scenario.
    Unattributed,
}

/// Output of one segmented stream.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub runs: Vec<ScenarioRun>,
    /// Events before the first identified scenario, in input order. Empty
    /// unless the segmenter was built with [`Segmenter::retaining_orphans`].
    pub leading_orphans: Vec<LogEvent>,
}

/// Streaming segmenter over one ordered event stream.
#[derive(Debug)]
pub struct Segmenter<'a> {
    config: &'a AnalyzerConfig,
    source_file: Option<String>,
    open: Option<ScenarioRun>,
    closed: Vec<ScenarioRun>,
    retain_orphans: bool,
    leading_orphans: Vec<LogEvent>,
}

impl<'a> Segmenter<'a> {
    #[must_use]
    pub const fn new(config: &'a AnalyzerConfig, source_file: Option<String>) -> Self {
        Self {
            config,
            source_file,
            open: None,
            closed: Vec::new(),
            retain_orphans: false,
            leading_orphans: Vec::new(),
        }
    }

    /// Keep events seen before the first run so a preceding piece of the
    /// same stream can claim them. Without this they are only counted.
    #[must_use]
    pub const fn retaining_orphans(mut self) -> Self {
        self.retain_orphans = true;
        self
    }

    /// Name of the open run, if any.
    #[must_use]
    pub fn open_scenario(&self) -> Option<&str> {
        self.open.as_ref().map(|run| run.name.as_str())
    }

    pub fn push(&mut self, event: LogEvent) -> Attribution {
        let identified = scenario::identify(&event);
        let mut attribution = Attribution::Joined;

        if let Some((source, name)) = identified {
            if self.open_scenario() != Some(name.as_str()) {
                debug!(
                    scenario = %name,
                    source = %source,
                    previous = self.open_scenario().unwrap_or("-"),
                    "scenario run opened"
                );
                self.close_open();
                self.open = Some(ScenarioRun::new(name, self.source_file.clone()));
                attribution = Attribution::Opened;
            }
        }

        if let Some(run) = self.open.as_mut() {
            run.observe(&event, self.config);
            attribution
        } else {
            if self.retain_orphans {
                self.leading_orphans.push(event);
            }
            Attribution::Unattributed
        }
    }

    fn close_open(&mut self) {
        if let Some(run) = self.open.take() {
            debug!(
                scenario = %run.name,
                events = run.event_count,
                verdict = %run.verdict,
                "scenario run closed"
            );
            self.closed.push(run);
        }
    }

    /// End of stream: close any open run.
    #[must_use]
    pub fn finish(mut self) -> Segmentation {
        self.close_open();
        Segmentation {
            runs: self.closed,
            leading_orphans: self.leading_orphans,
        }
    }
}
