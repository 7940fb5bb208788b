//! End-to-end analysis of simulation logs, from JSONL text or files to the
//! final report.

use std::path::PathBuf;

use serde_json::json;
use simverdict_analysis::{
    Analyzer, AnalyzerConfig, PolicyLoadMode, Report, ThresholdPolicy, load_policy,
};
use simverdict_error::VerdictError;
use simverdict_types::Verdict;

// ─── Fixtures ────────────────────────────────────────────────────────────

fn line(value: &serde_json::Value) -> String {
    format!("{value}\n")
}

/// A healthy run: operation summaries, a passing assertion and a completion
/// summary with cumulative counters.
fn baseline_log(trace_id: &str) -> String {
    let ts = |s: u32| format!("2026-02-13T09:00:{s:02}.000Z");
    let mut out = String::new();
    out.push_str(&line(&json!({
        "timestamp": ts(0), "level": "INFO", "target": "sim::scenario",
        "message": "Starting scenario: baseline",
        "fields": {"event_type": "scenario_start"}, "trace_id": trace_id
    })));
    for (s, (operation, count, avg)) in [
        ("sign", 500, 300),
        ("verify", 500, 150),
        ("encapsulate", 200, 80),
        ("decapsulate", 200, 90),
    ]
    .into_iter()
    .enumerate()
    {
        out.push_str(&line(&json!({
            "timestamp": ts(1 + u32::try_from(s).unwrap()), "level": "INFO", "target": "sim::pq",
            "message": "benchmark summary",
            "fields": {"operation": operation, "count": count, "latency_avg_us": avg},
            "trace_id": trace_id
        })));
    }
    out.push_str(&line(&json!({
        "timestamp": ts(6), "level": "INFO", "target": "sim::checks",
        "message": "Assertion passed: all peers connected",
        "fields": {"assertion": "peers_connected", "passed": true, "expected": 3, "actual": 3},
        "trace_id": trace_id
    })));
    out.push_str(&line(&json!({
        "timestamp": ts(7), "level": "INFO", "target": "sim::pq",
        "message": "run completed",
        "fields": {
            "status": "completed", "duration_ms": 1200, "delivery_rate": 99.5,
            "total_signatures_created": 500, "total_signatures_verified": 500,
            "signature_failures": 0, "total_kem_encapsulations": 200,
            "total_kem_decapsulations": 200, "kem_failures": 0,
            "invites_created": 10, "invites_accepted": 10, "invites_failed": 0
        },
        "trace_id": trace_id
    })));
    out
}

fn analyzer(policy: ThresholdPolicy) -> Analyzer {
    simverdict_analysis::logging::init_test_logging();
    Analyzer::new(AnalyzerConfig::default(), policy).expect("default config is valid")
}

fn analyze(text: &str) -> Report {
    analyzer(ThresholdPolicy::default())
        .analyze_str(text)
        .expect("in-memory analysis cannot fail")
}

// ─── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn baseline_scenario_passes_default_policy() {
    let report = analyze(&baseline_log("trace-1"));

    assert_eq!(report.verdict, Verdict::Pass, "report: {}", report.summary_line());
    assert_eq!(report.summary.total_runs, 1);
    assert_eq!(report.summary.passed, 1);
    assert!(report.summary.failed_checks.is_empty());
    assert!((report.summary.pass_rate - 100.0).abs() < 1e-9);
    assert_eq!(report.test_run_id.as_deref(), Some("trace-1"));

    let run = &report.scenarios["baseline"][0];
    assert_eq!(run.run.verdict, Verdict::Pass);
    assert_eq!(run.run.event_count, 7);
    assert_eq!(run.run.duration_ms, Some(1200.0));
    assert_eq!(run.run.scenario_metrics.get("delivery_rate"), Some(&99.5));
    assert_eq!(run.run.event_counts.get("scenario_start"), Some(&1));
    assert_eq!(run.run.assertions.len(), 1);

    let names: Vec<&str> = run.run.checks.iter().map(|c| c.metric_name.as_str()).collect();
    for expected in [
        "signature_latency_p99_us",
        "signature_throughput",
        "signature_failure_rate",
        "verification_latency_p99_us",
        "verification_failure_rate",
        "kem_encap_throughput",
        "kem_decap_failure_rate",
        "invite_success_rate",
    ] {
        assert!(names.contains(&expected), "missing check {expected}: {names:?}");
    }
    assert!(run.run.checks.iter().all(|c| c.passed), "{:?}", run.run.checks);

    let sign = &run.operations["sign"];
    assert_eq!(sign.success_count, 500);
    assert_eq!(sign.latency.count, 100, "summary samples are capped");
    assert_eq!(sign.synthesized_samples, 100);
    assert_eq!(sign.latency.p99_us, 300);
    assert!(
        (sign.latency.throughput_ops_per_sec - 3333.33).abs() < 0.01,
        "throughput {}",
        sign.latency.throughput_ops_per_sec
    );
    assert_eq!(run.invites.map(|i| i.success_rate), Some(Some(1.0)));

    assert_eq!(report.global.verdict, Verdict::Pass);
    assert_eq!(report.summary.total_operations, 1400);
    assert_eq!(
        report.recommendations,
        vec!["All tests passed! No recommendations at this time."]
    );
}

#[test]
fn latency_breach_fails_with_actual_and_target() {
    let mut text = line(&json!({"scenario": "stress", "message": "start"}));
    for _ in 0..20 {
        text.push_str(&line(&json!({
            "fields": {"operation": "sign", "latency_us": 1200}
        })));
    }
    let report = analyze(&text);
    assert_eq!(report.verdict, Verdict::Fail);

    let run = &report.scenarios["stress"][0].run;
    let check = run
        .checks
        .iter()
        .find(|c| c.metric_name == "signature_latency_p99_us")
        .expect("p99 check present");
    assert!(!check.passed);
    assert!((check.actual_value - 1200.0).abs() < f64::EPSILON);
    assert!((check.target_value - 1000.0).abs() < f64::EPSILON);
    assert!(
        report
            .summary
            .failed_checks
            .contains(&"stress/signature_latency_p99_us".to_owned())
    );
    assert!(
        report
            .summary
            .failed_checks
            .contains(&"global/signature_latency_p99_us".to_owned())
    );
}

#[test]
fn one_malformed_line_among_ten() {
    let mut lines: Vec<String> = (0..10)
        .map(|i| {
            json!({"scenario": "baseline", "message": format!("tick {i}")}).to_string()
        })
        .collect();
    lines[4] = "{\"scenario\": \"baseline\", truncated".to_owned();
    let report = analyze(&lines.join("\n"));

    assert_eq!(report.diagnostics.lines_read, 10);
    assert_eq!(report.diagnostics.events_parsed, 9);
    assert_eq!(report.diagnostics.malformed_lines, 1);
    assert_eq!(report.diagnostics.malformed[0].line, 5);
    assert_eq!(report.scenarios["baseline"][0].run.event_count, 9);
}

#[test]
fn segmentation_a_a_b_a_gives_three_runs() {
    let text: String = ["A", "A", "B", "A"]
        .iter()
        .map(|name| line(&json!({"scenario": name})))
        .collect();
    let report = analyze(&text);
    assert_eq!(report.summary.total_runs, 3);
    assert_eq!(report.summary.unique_scenarios, 2);
    assert_eq!(report.scenarios["A"].len(), 2);
    assert_eq!(report.scenarios["A"][0].run.event_count, 2);
    assert_eq!(report.scenarios["B"].len(), 1);
}

#[test]
fn scenario_target_without_name_opens_unknown_run() {
    let mut text = baseline_log("trace-1");
    text.push_str(&line(&json!({
        "level": "INFO", "target": "sim::scenario", "message": "teardown"
    })));
    text.push_str(&line(&json!({
        "level": "INFO", "target": "sim::Scenario", "message": "still tearing down"
    })));

    let report = analyze(&text);
    let names: Vec<&str> = report.runs().map(|r| r.run.name.as_str()).collect();
    assert_eq!(names, vec!["baseline", "unknown"]);
    assert_eq!(report.scenarios["unknown"][0].run.event_count, 2);
    assert_eq!(report.scenarios["baseline"][0].run.event_count, 7);
}

#[test]
fn no_signal_means_unknown() {
    let report = analyze(&line(&json!({"scenario": "idle", "message": "waiting"})));
    assert_eq!(report.verdict, Verdict::Unknown);
    assert_eq!(report.summary.unknown, 1);
    assert!(report.global.checks.is_empty());

    let strict = Analyzer::new(
        AnalyzerConfig {
            unknown_is_failure: true,
            ..AnalyzerConfig::default()
        },
        ThresholdPolicy::default(),
    )
    .unwrap()
    .analyze_str(&line(&json!({"scenario": "idle"})))
    .unwrap();
    assert_eq!(strict.verdict, Verdict::Fail);
}

#[test]
fn failed_run_gets_recommendations() {
    let mut text = line(&json!({"scenario": "lossy_network"}));
    for i in 0..12 {
        text.push_str(&line(&json!({"level": "ERROR", "message": format!("send failed {i}")})));
    }
    text.push_str(&line(&json!({
        "message": "assertion failed: delivery",
        "fields": {"expected": 95, "actual": 70}
    })));
    text.push_str(&line(&json!({
        "message": "run completed",
        "fields": {"delivery_rate": 70.0, "avg_latency_ms": 1500}
    })));
    let report = analyze(&text);

    let run = &report.scenarios["lossy_network"][0].run;
    assert_eq!(run.verdict, Verdict::Fail);
    assert_eq!(run.error_count, 12);
    assert_eq!(run.errors.len(), 10);
    assert_eq!(report.recommendations.len(), 3, "{:?}", report.recommendations);
    assert!(report.recommendations.iter().all(|r| r.starts_with("lossy_network:")));
}

#[test]
fn metric_bounds_from_custom_policy() {
    let policy = ThresholdPolicy::from_json_str(
        r#"{"metrics": {"delivery_rate": {"min": 90, "max": 100}}}"#,
        "inline",
    )
    .unwrap();
    let text = format!(
        "{}{}",
        line(&json!({"scenario": "relay"})),
        line(&json!({"message": "run completed", "fields": {"delivery_rate": 85.0}}))
    );
    let report = analyzer(policy).analyze_str(&text).unwrap();
    let checks = &report.scenarios["relay"][0].run.checks;
    assert_eq!(checks.len(), 2);
    assert!(!checks[0].passed, "85 is below the minimum of 90");
    assert!(checks[1].passed);
    assert_eq!(report.verdict, Verdict::Fail);
}

// ─── Files ───────────────────────────────────────────────────────────────

#[test]
fn runs_do_not_span_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("01.jsonl"), baseline_log("trace-b")).unwrap();
    std::fs::write(
        dir.path().join("02.jsonl"),
        line(&json!({"message": "assertion passed", "trace_id": "trace-a"})),
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "not a log").unwrap();

    let report = analyzer(ThresholdPolicy::default())
        .analyze_files(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(report.diagnostics.files_processed, 2);
    assert_eq!(report.diagnostics.unattributed_events, 1);
    assert_eq!(report.summary.total_runs, 1);
    assert_eq!(report.scenarios["baseline"][0].run.assertions.len(), 1);
    assert_eq!(report.test_run_id.as_deref(), Some("trace-a"));
    assert!(report.diagnostics.files[0].path.ends_with("01.jsonl"));
    assert!(report.diagnostics.files[0].sha256.starts_with("sha256:"));
    assert_eq!(report.diagnostics.unique_traces, 2);
}

#[test]
fn missing_input_is_fatal() {
    let err = analyzer(ThresholdPolicy::default())
        .analyze_files(&[PathBuf::from("/definitely/not/here.jsonl")])
        .unwrap_err();
    assert!(matches!(err, VerdictError::MissingInputFile { .. }), "{err}");
    assert!(err.is_fatal());
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn empty_input_list_is_fatal() {
    let err = analyzer(ThresholdPolicy::default())
        .analyze_files(&[])
        .unwrap_err();
    assert!(matches!(err, VerdictError::NoMatchingFiles { .. }), "{err}");
}

#[test]
fn invalid_policy_fallback_still_analyzes() {
    let dir = tempfile::tempdir().unwrap();
    let policy_path = dir.path().join("thresholds.json");
    std::fs::write(&policy_path, r#"{"signature": {"latency_p99_us": -5}}"#).unwrap();

    let policy = load_policy(Some(&policy_path), PolicyLoadMode::FallbackToDefault).unwrap();
    let report = analyzer(policy).analyze_str(&baseline_log("t")).unwrap();
    assert_eq!(report.verdict, Verdict::Pass);

    let err = load_policy(Some(&policy_path), PolicyLoadMode::Required).unwrap_err();
    assert!(matches!(err, VerdictError::InvalidThresholdPolicy { .. }), "{err}");
}

#[test]
fn report_json_reloads() {
    let report = analyze(&baseline_log("trace-1"));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("report.json");
    report.write_json(&path).unwrap();

    let reloaded: Report =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(reloaded.verdict, report.verdict);
    assert_eq!(reloaded.summary, report.summary);
    assert_eq!(reloaded.global.verdict, report.global.verdict);
    assert_eq!(reloaded.global.checks.len(), report.global.checks.len());
    assert_eq!(reloaded.diagnostics, report.diagnostics);

    let (before, after) = (
        &report.scenarios["baseline"][0],
        &reloaded.scenarios["baseline"][0],
    );
    assert_eq!(after.run.assertions, before.run.assertions);
    assert_eq!(
        after.operations.keys().collect::<Vec<_>>(),
        before.operations.keys().collect::<Vec<_>>()
    );
    for (name, op) in &before.operations {
        let again = &after.operations[name];
        assert_eq!(again.success_count, op.success_count, "{name}");
        assert_eq!(again.latency.p99_us, op.latency.p99_us, "{name}");
        assert_eq!(again.latency.count, op.latency.count, "{name}");
    }
}
