//! Run-scoped analysis state.
//!
//! One [`AnalysisContext`] lives for a whole analysis and is threaded through
//! the pipeline by `&mut`. It owns everything that is not scoped to a single
//! scenario run: the global operation table, the trace-id set and the
//! diagnostics that end up in the report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use simverdict_error::VerdictError;
use simverdict_types::LogEvent;

use crate::metrics::OperationTable;

/// A skipped line, kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedLineRecord {
    pub source: String,
    pub line: usize,
    pub detail: String,
}

/// Per-input accounting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileDiagnostics {
    pub path: String,
    /// `sha256:<hex>` over the exact bytes read.
    pub sha256: String,
    pub bytes_read: u64,
    pub lines: u64,
    pub events: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
    pub unattributed_events: u64,
    pub runs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub files_processed: u64,
    pub lines_read: u64,
    pub events_parsed: u64,
    pub blank_lines: u64,
    pub malformed_lines: u64,
    /// Events seen before any scenario was identified in their input.
    pub unattributed_events: u64,
    pub unique_traces: u64,
    pub files: Vec<FileDiagnostics>,
    /// The first `malformed_line_limit` skipped lines.
    pub malformed: Vec<MalformedLineRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisContext {
    pub diagnostics: Diagnostics,
    /// Every event's operation metrics, attributed or not.
    pub global: OperationTable,
    pub trace_ids: BTreeSet<String>,
    malformed_line_limit: usize,
}

impl AnalysisContext {
    #[must_use]
    pub fn new(malformed_line_limit: usize) -> Self {
        Self {
            diagnostics: Diagnostics::default(),
            global: OperationTable::default(),
            trace_ids: BTreeSet::new(),
            malformed_line_limit,
        }
    }

    /// Feed a parsed event into the global accumulators.
    pub fn observe_event(&mut self, event: &LogEvent, synthesized_cap: usize) {
        self.diagnostics.events_parsed += 1;
        if let Some(trace_id) = event.trace_id() {
            self.trace_ids.insert(trace_id);
        }
        self.global.record_event(event, synthesized_cap);
    }

    /// Count a skipped line, keeping its details while under the limit.
    pub fn record_malformed(&mut self, source: &str, error: &VerdictError) {
        self.diagnostics.malformed_lines += 1;
        if self.diagnostics.malformed.len() >= self.malformed_line_limit {
            return;
        }
        let (line, detail) = match error {
            VerdictError::MalformedLine { line, detail } => (*line, detail.clone()),
            other => (0, other.to_string()),
        };
        self.diagnostics.malformed.push(MalformedLineRecord {
            source: source.to_owned(),
            line,
            detail,
        });
    }

    pub fn record_file(&mut self, file: FileDiagnostics) {
        let d = &mut self.diagnostics;
        d.files_processed += 1;
        d.lines_read += file.lines;
        d.blank_lines += file.blank_lines;
        d.unattributed_events += file.unattributed_events;
        d.files.push(file);
    }

    /// Lexicographically first trace id seen.
    #[must_use]
    pub fn test_run_id(&self) -> Option<&str> {
        self.trace_ids.first().map(String::as_str)
    }

    /// Fold the context of a later input into this one.
    pub fn merge(&mut self, later: Self) {
        let d = &mut self.diagnostics;
        let l = later.diagnostics;
        d.files_processed += l.files_processed;
        d.lines_read += l.lines_read;
        d.events_parsed += l.events_parsed;
        d.blank_lines += l.blank_lines;
        d.malformed_lines += l.malformed_lines;
        d.unattributed_events += l.unattributed_events;
        d.files.extend(l.files);
        d.malformed.extend(l.malformed);
        d.malformed.truncate(self.malformed_line_limit);
        self.global.merge(&later.global);
        self.trace_ids.extend(later.trace_ids);
    }

    /// Finalize derived counters before the diagnostics are reported.
    #[must_use]
    pub fn into_parts(mut self) -> (Diagnostics, OperationTable, Option<String>) {
        self.diagnostics.unique_traces = self.trace_ids.len() as u64;
        let test_run_id = self.trace_ids.pop_first();
        (self.diagnostics, self.global, test_run_id)
    }
}
