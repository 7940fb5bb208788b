//! Analysis pipeline: input discovery, per-input passes, partial merging and
//! final evaluation.
//!
//! Inputs are processed sequentially in the order given, each line once.
//! Runs never span two input files. Split pieces of one stream can be
//! analyzed separately and stitched back with [`PartialAnalysis::merge`].

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use simverdict_error::{Result, VerdictError};
use simverdict_types::LogEvent;
use tracing::{info, warn};

use crate::config::AnalyzerConfig;
use crate::context::{AnalysisContext, FileDiagnostics};
use crate::parser::parse_line;
use crate::policy::{BUILTIN_POLICY_SOURCE, ThresholdPolicy};
use crate::report::{GlobalReport, Report, ReportInputs, assemble};
use crate::segmenter::{Attribution, ScenarioRun, Segmenter};
use crate::threshold::{evaluate_metrics, evaluate_operations};

/// Extension of log files picked up from input directories.
pub const LOG_FILE_EXTENSION: &str = "jsonl";

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Expand inputs into the ordered list of log files to analyze.
///
/// Files are taken as given; directories contribute their `*.jsonl` entries
/// in sorted order. A missing path is fatal, as is an empty result.
pub fn discover_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext == LOG_FILE_EXTENSION)
                })
                .collect();
            found.sort();
            files.extend(found);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(VerdictError::MissingInputFile {
                path: input.clone(),
            });
        }
    }
    if files.is_empty() {
        let pattern = if inputs.is_empty() {
            format!("*.{LOG_FILE_EXTENSION}")
        } else {
            inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        return Err(VerdictError::NoMatchingFiles { pattern });
    }
    Ok(files)
}

// ---------------------------------------------------------------------------
// Partial analysis
// ---------------------------------------------------------------------------

/// Unevaluated result of analyzing one input or one piece of an input.
#[derive(Debug, Clone)]
pub struct PartialAnalysis {
    pub runs: Vec<ScenarioRun>,
    /// Events before the first identified scenario, in input order. Only
    /// [`Analyzer::analyze_partial`] keeps them; other entry points count them.
    pub leading_orphans: Vec<LogEvent>,
    pub context: AnalysisContext,
}

impl PartialAnalysis {
    #[must_use]
    pub fn empty(config: &AnalyzerConfig) -> Self {
        Self {
            runs: Vec::new(),
            leading_orphans: Vec::new(),
            context: AnalysisContext::new(config.malformed_line_limit),
        }
    }

    /// Append an independent input: its runs stay separate from ours and its
    /// leading orphans can never be claimed, so they are dropped.
    pub fn append(&mut self, other: Self) {
        self.context.merge(other.context);
        self.runs.extend(other.runs);
    }

    /// Stitch the next piece of the same stream onto this one.
    ///
    /// The run open at the end of this piece absorbs the next piece's
    /// leading orphans and, if it has the same name, the next piece's first
    /// run.
    #[must_use]
    pub fn merge(mut self, next: Self, config: &AnalyzerConfig) -> Self {
        let Self {
            runs: next_runs,
            leading_orphans,
            mut context,
        } = next;

        let mut next_runs = next_runs.into_iter().peekable();
        match self.runs.last_mut() {
            Some(open) => {
                for event in &leading_orphans {
                    open.observe(event, config);
                }
                reattribute(&mut context, leading_orphans.len() as u64);
                if let Some(first) = next_runs.next_if(|run| run.name == open.name) {
                    open.absorb(first, config.excerpt_limit);
                }
            }
            None => self.leading_orphans.extend(leading_orphans),
        }
        self.context.merge(context);
        self.runs.extend(next_runs);
        self
    }
}

/// Orphans claimed by an earlier piece are no longer unattributed; they come
/// first in stream order, so earlier files give up their counts first.
fn reattribute(context: &mut AnalysisContext, absorbed: u64) {
    let d = &mut context.diagnostics;
    d.unattributed_events = d.unattributed_events.saturating_sub(absorbed);
    let mut remaining = absorbed;
    for file in &mut d.files {
        let take = remaining.min(file.unattributed_events);
        file.unattributed_events -= take;
        remaining -= take;
        if remaining == 0 {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Entry point for running an analysis.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    policy: ThresholdPolicy,
    policy_source: String,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, policy: ThresholdPolicy) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            policy,
            policy_source: BUILTIN_POLICY_SOURCE.to_owned(),
        })
    }

    /// Label the policy's origin in the report.
    #[must_use]
    pub fn with_policy_source(mut self, source: impl Into<String>) -> Self {
        self.policy_source = source.into();
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    #[must_use]
    pub const fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    /// Analyze log files (or directories of them) into a report.
    pub fn analyze_files(&self, inputs: &[PathBuf]) -> Result<Report> {
        let files = discover_inputs(inputs)?;
        let mut combined = PartialAnalysis::empty(&self.config);
        for path in &files {
            combined.append(self.analyze_file(path)?);
        }
        Ok(self.finish(combined))
    }

    /// Analyze one file without evaluating it. The file is treated as a
    /// complete input, so its leading orphans are counted but not kept.
    pub fn analyze_file(&self, path: &Path) -> Result<PartialAnalysis> {
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => VerdictError::MissingInputFile {
                path: path.to_path_buf(),
            },
            _ => VerdictError::Io(err),
        })?;
        self.scan(BufReader::new(file), &path.display().to_string(), false)
    }

    /// Analyze in-memory log text into a report.
    pub fn analyze_str(&self, text: &str) -> Result<Report> {
        self.analyze_reader(text.as_bytes(), "<memory>")
    }

    /// Analyze any buffered reader into a report.
    pub fn analyze_reader<R: BufRead>(&self, reader: R, source: &str) -> Result<Report> {
        let partial = self.scan(reader, source, false)?;
        Ok(self.finish(partial))
    }

    /// One sequential pass over a piece of a stream, keeping what
    /// [`PartialAnalysis::merge`] needs to stitch it to the previous piece.
    pub fn analyze_partial<R: BufRead>(&self, reader: R, source: &str) -> Result<PartialAnalysis> {
        self.scan(reader, source, true)
    }

    fn scan<R: BufRead>(&self, mut reader: R, source: &str, stitchable: bool) -> Result<PartialAnalysis> {
        let mut context = AnalysisContext::new(self.config.malformed_line_limit);
        let mut segmenter = Segmenter::new(&self.config, Some(source.to_owned()));
        if stitchable {
            segmenter = segmenter.retaining_orphans();
        }
        let mut hasher = Sha256::new();
        let mut file = FileDiagnostics {
            path: source.to_owned(),
            ..FileDiagnostics::default()
        };
        let mut buf = Vec::new();
        let mut line_number = 0_usize;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf);
            file.bytes_read += read as u64;
            line_number += 1;
            file.lines += 1;

            let parsed = std::str::from_utf8(&buf)
                .map_err(|err| VerdictError::malformed(line_number, format!("invalid UTF-8: {err}")))
                .and_then(|line| parse_line(line, line_number));
            match parsed {
                Ok(Some(event)) => {
                    file.events += 1;
                    context.observe_event(&event, self.config.synthesized_sample_cap);
                    if segmenter.push(event) == Attribution::Unattributed {
                        file.unattributed_events += 1;
                    }
                }
                Ok(None) => file.blank_lines += 1,
                Err(err) => {
                    warn!(source, line = line_number, error = %err, "skipping malformed log line");
                    file.malformed_lines += 1;
                    context.record_malformed(source, &err);
                }
            }
        }

        let segmentation = segmenter.finish();
        file.sha256 = format!("sha256:{:x}", hasher.finalize());
        file.runs = segmentation.runs.len() as u64;
        info!(
            source,
            lines = file.lines,
            events = file.events,
            malformed = file.malformed_lines,
            unattributed = file.unattributed_events,
            runs = file.runs,
            "log input analyzed"
        );
        context.record_file(file);

        Ok(PartialAnalysis {
            runs: segmentation.runs,
            leading_orphans: segmentation.leading_orphans,
            context,
        })
    }

    /// Evaluate thresholds and assemble the report.
    #[must_use]
    pub fn finish(&self, partial: PartialAnalysis) -> Report {
        let PartialAnalysis {
            mut runs, context, ..
        } = partial;
        for run in &mut runs {
            let mut checks = evaluate_operations(&self.policy, &run.operations);
            checks.extend(evaluate_metrics(&self.policy, &run.scenario_metrics));
            run.apply_checks(checks);
        }

        let (diagnostics, global_table, test_run_id) = context.into_parts();
        let global_checks = evaluate_operations(&self.policy, &global_table);
        let global = GlobalReport::new(&global_table, global_checks);

        let report = assemble(
            runs,
            ReportInputs {
                generated_unix_ms: unix_millis_now(),
                test_run_id,
                policy_source: self.policy_source.clone(),
                global,
                diagnostics,
            },
            &self.config,
        );
        info!(
            verdict = %report.verdict,
            runs = report.summary.total_runs,
            failed = report.summary.failed,
            failed_checks = report.summary.failed_checks.len(),
            "report assembled"
        );
        report
    }
}

fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
