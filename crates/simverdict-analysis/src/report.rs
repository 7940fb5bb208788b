//! Report assembly.
//!
//! Pure aggregation over evaluated runs: nothing here reads input or
//! evaluates thresholds.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use simverdict_error::{Result, VerdictError};
use simverdict_types::Verdict;

use crate::config::{AnalyzerConfig, RecommendationRules};
use crate::context::Diagnostics;
use crate::metrics::{InviteSummary, OperationSummary, OperationTable};
use crate::segmenter::ScenarioRun;
use crate::threshold::ThresholdCheck;

/// Schema identifier for serialized reports.
pub const REPORT_SCHEMA_VERSION: &str = "simverdict.report.v1";

/// Single recommendation emitted when no failed run triggers a heuristic.
pub const ALL_PASSED_RECOMMENDATION: &str = "All tests passed! No recommendations at this time.";

/// One run with its derived operation statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub run: ScenarioRun,
    pub operations: BTreeMap<String, OperationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invites: Option<InviteSummary>,
}

impl RunReport {
    #[must_use]
    pub fn new(run: ScenarioRun) -> Self {
        let (operations, invites) = table_view(&run.operations);
        Self {
            run,
            operations,
            invites,
        }
    }
}

/// Statistics and checks over every event of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalReport {
    pub operations: BTreeMap<String, OperationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invites: Option<InviteSummary>,
    pub total_operations: u64,
    pub checks: Vec<ThresholdCheck>,
    pub verdict: Verdict,
}

impl GlobalReport {
    #[must_use]
    pub fn new(table: &OperationTable, checks: Vec<ThresholdCheck>) -> Self {
        let (operations, invites) = table_view(table);
        let mut verdict = Verdict::Unknown;
        crate::threshold::fold_checks(&mut verdict, &checks);
        Self {
            operations,
            invites,
            total_operations: table.total_operations(),
            checks,
            verdict,
        }
    }
}

fn table_view(
    table: &OperationTable,
) -> (BTreeMap<String, OperationSummary>, Option<InviteSummary>) {
    let invites = table
        .invites
        .is_active()
        .then(|| table.invites.summary());
    (table.summaries(), invites)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_runs: u64,
    pub unique_scenarios: u64,
    pub passed: u64,
    pub failed: u64,
    pub unknown: u64,
    /// `passed / total_runs * 100`, or 0 with no runs.
    pub pass_rate: f64,
    pub total_checks: u64,
    /// `<scenario>/<check>` and `global/<check>` names, sorted and unique.
    pub failed_checks: Vec<String>,
    /// Successful operations across the global table.
    pub total_operations: u64,
}

/// Immutable analysis output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub generated_unix_ms: u64,
    pub test_run_id: Option<String>,
    pub policy_source: String,
    pub verdict: Verdict,
    pub summary: ReportSummary,
    pub scenarios: BTreeMap<String, Vec<RunReport>>,
    pub global: GlobalReport,
    pub diagnostics: Diagnostics,
    pub recommendations: Vec<String>,
}

/// Everything [`assemble`] needs besides the runs themselves.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub generated_unix_ms: u64,
    pub test_run_id: Option<String>,
    pub policy_source: String,
    pub global: GlobalReport,
    pub diagnostics: Diagnostics,
}

/// Build the report from evaluated runs (input order preserved per scenario).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn assemble(runs: Vec<ScenarioRun>, inputs: ReportInputs, config: &AnalyzerConfig) -> Report {
    let mut verdict = Verdict::Unknown;
    let mut passed = 0_u64;
    let mut failed = 0_u64;
    let mut unknown = 0_u64;
    let mut total_checks = 0_u64;
    let mut failed_checks = BTreeSet::new();

    for run in &runs {
        match run.verdict {
            Verdict::Pass => {
                passed += 1;
                verdict.record_pass();
            }
            Verdict::Fail => {
                failed += 1;
                verdict.record_failure();
            }
            Verdict::Unknown => {
                unknown += 1;
                if config.unknown_is_failure {
                    verdict.record_failure();
                }
            }
        }
        total_checks += run.checks.len() as u64;
        for check in run.checks.iter().filter(|c| !c.passed) {
            failed_checks.insert(format!("{}/{}", run.name, check.metric_name));
        }
    }
    total_checks += inputs.global.checks.len() as u64;
    for check in inputs.global.checks.iter().filter(|c| !c.passed) {
        failed_checks.insert(format!("global/{}", check.metric_name));
    }
    verdict = verdict.combine(inputs.global.verdict);

    let total_runs = runs.len() as u64;
    let mut scenarios: BTreeMap<String, Vec<RunReport>> = BTreeMap::new();
    for run in runs {
        scenarios
            .entry(run.name.clone())
            .or_default()
            .push(RunReport::new(run));
    }
    let recommendations = recommendations(&scenarios, &config.recommendations);

    Report {
        schema_version: REPORT_SCHEMA_VERSION.to_owned(),
        generated_unix_ms: inputs.generated_unix_ms,
        test_run_id: inputs.test_run_id,
        policy_source: inputs.policy_source,
        verdict,
        summary: ReportSummary {
            total_runs,
            unique_scenarios: scenarios.len() as u64,
            passed,
            failed,
            unknown,
            pass_rate: if total_runs == 0 {
                0.0
            } else {
                passed as f64 / total_runs as f64 * 100.0
            },
            total_checks,
            failed_checks: failed_checks.into_iter().collect(),
            total_operations: inputs.global.total_operations,
        },
        scenarios,
        global: inputs.global,
        diagnostics: inputs.diagnostics,
        recommendations,
    }
}

/// Heuristic advice for scenarios with failed runs.
#[must_use]
pub fn recommendations(
    scenarios: &BTreeMap<String, Vec<RunReport>>,
    rules: &RecommendationRules,
) -> Vec<String> {
    let mut out = Vec::new();
    for (name, runs) in scenarios {
        let failed: Vec<&ScenarioRun> = runs
            .iter()
            .map(|r| &r.run)
            .filter(|run| run.verdict.is_fail())
            .collect();
        if failed.is_empty() {
            continue;
        }
        if failed.iter().any(|run| run.error_count > rules.max_errors) {
            out.push(format!(
                "{name}: high error count. Review the error excerpts for the root cause."
            ));
        }
        if failed.iter().any(|run| {
            run.scenario_metrics
                .get("delivery_rate")
                .is_some_and(|&rate| rate < rules.min_delivery_rate)
        }) {
            out.push(format!(
                "{name}: low message delivery rate. Check network reliability and retry logic."
            ));
        }
        if failed.iter().any(|run| {
            run.scenario_metrics
                .get("avg_latency_ms")
                .is_some_and(|&ms| ms > rules.max_avg_latency_ms)
        }) {
            out.push(format!(
                "{name}: high average latency. Profile the critical path or add capacity."
            ));
        }
    }
    if out.is_empty() {
        out.push(ALL_PASSED_RECOMMENDATION.to_owned());
    }
    out
}

impl Report {
    /// Serialize to pretty-printed JSON.
    pub fn to_pretty_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the pretty JSON report to `path`, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = self
            .to_pretty_json()
            .map_err(|err| VerdictError::serialization(err.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, format!("{json}\n"))?;
        Ok(())
    }

    /// Every run, in scenario-name order.
    pub fn runs(&self) -> impl Iterator<Item = &RunReport> {
        self.scenarios.values().flatten()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let s = &self.summary;
        format!(
            "verdict={} runs={} passed={} failed={} unknown={} pass_rate={:.1}% failed_checks={} malformed_lines={}",
            self.verdict,
            s.total_runs,
            s.passed,
            s.failed,
            s.unknown,
            s.pass_rate,
            s.failed_checks.len(),
            self.diagnostics.malformed_lines,
        )
    }
}
