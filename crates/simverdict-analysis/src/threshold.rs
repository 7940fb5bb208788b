//! Threshold evaluation.
//!
//! Every declared bound is checked independently. A breach is reported as a
//! [`ThresholdCheck`] with `passed = false`, never as an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use simverdict_types::Verdict;

use crate::metrics::{OperationMetrics, OperationTable};
use crate::policy::{CategoryTarget, OperationBounds, ThresholdPolicy, category_target};

/// Outcome of one bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub metric_name: String,
    pub target_value: f64,
    pub actual_value: f64,
    pub passed: bool,
}

impl ThresholdCheck {
    fn at_most(metric_name: String, target_value: f64, actual_value: f64) -> Self {
        Self {
            metric_name,
            target_value,
            actual_value,
            passed: actual_value <= target_value,
        }
    }

    fn at_least(metric_name: String, target_value: f64, actual_value: f64) -> Self {
        Self {
            metric_name,
            target_value,
            actual_value,
            passed: actual_value >= target_value,
        }
    }
}

/// Evaluate every operation category of `policy` against `table`.
#[must_use]
pub fn evaluate_operations(policy: &ThresholdPolicy, table: &OperationTable) -> Vec<ThresholdCheck> {
    let mut checks = Vec::new();
    for (category, bounds) in &policy.operations {
        match category_target(category) {
            CategoryTarget::Slot(slot) => {
                check_operation(&mut checks, category, bounds, table.slot(slot));
            }
            CategoryTarget::Other(name) => {
                if let Some(metrics) = table.operation(name) {
                    check_operation(&mut checks, category, bounds, metrics);
                }
            }
            CategoryTarget::Invites => {
                if let (Some(target), Some(actual)) =
                    (bounds.success_rate_min, table.invites.success_rate())
                {
                    checks.push(ThresholdCheck::at_least(
                        format!("{category}_success_rate"),
                        target,
                        actual,
                    ));
                }
            }
        }
    }
    checks
}

#[allow(clippy::cast_precision_loss)]
fn check_operation(
    checks: &mut Vec<ThresholdCheck>,
    category: &str,
    bounds: &OperationBounds,
    metrics: &OperationMetrics,
) {
    let latency = metrics.latency();
    if latency.count > 0 {
        if let Some(target) = bounds.latency_p99_us {
            checks.push(ThresholdCheck::at_most(
                format!("{category}_latency_p99_us"),
                target,
                latency.p99_us as f64,
            ));
        }
        if let Some(target) = bounds.throughput_min {
            checks.push(ThresholdCheck::at_least(
                format!("{category}_throughput"),
                target,
                latency.throughput_ops_per_sec,
            ));
        }
    }
    if let (Some(target), Some(actual)) = (bounds.failure_rate_max, metrics.failure_rate()) {
        checks.push(ThresholdCheck::at_most(
            format!("{category}_failure_rate"),
            target,
            actual,
        ));
    }
    if let (Some(target), Some(actual)) = (bounds.success_rate_min, metrics.success_rate()) {
        checks.push(ThresholdCheck::at_least(
            format!("{category}_success_rate"),
            target,
            actual,
        ));
    }
}

/// Evaluate generic `{min, max}` bounds against the metrics that exist.
#[must_use]
pub fn evaluate_metrics(
    policy: &ThresholdPolicy,
    metrics: &BTreeMap<String, f64>,
) -> Vec<ThresholdCheck> {
    let mut checks = Vec::new();
    for (name, bounds) in &policy.metrics {
        let Some(&actual) = metrics.get(name) else {
            continue;
        };
        if let Some(min) = bounds.min {
            checks.push(ThresholdCheck::at_least(format!("{name}_min"), min, actual));
        }
        if let Some(max) = bounds.max {
            checks.push(ThresholdCheck::at_most(format!("{name}_max"), max, actual));
        }
    }
    checks
}

/// Fold check outcomes into a verdict.
pub fn fold_checks(verdict: &mut Verdict, checks: &[ThresholdCheck]) {
    for check in checks {
        verdict.record(check.passed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MetricBounds;

    fn policy(category: &str, bounds: OperationBounds) -> ThresholdPolicy {
        let mut policy = ThresholdPolicy::empty();
        policy.operations.insert(category.to_owned(), bounds);
        policy
    }

    #[test]
    fn p99_breach_is_a_failed_check() {
        let mut table = OperationTable::default();
        table.sign.latency_samples = vec![1200; 10];
        let policy = policy(
            "signature",
            OperationBounds {
                latency_p99_us: Some(1000.0),
                ..OperationBounds::default()
            },
        );
        let checks = evaluate_operations(&policy, &table);
        assert_eq!(
            checks,
            vec![ThresholdCheck {
                metric_name: "signature_latency_p99_us".to_owned(),
                target_value: 1000.0,
                actual_value: 1200.0,
                passed: false,
            }]
        );
    }

    #[test]
    fn latency_bounds_need_samples() {
        let mut table = OperationTable::default();
        table.verify.record_successes(100);
        let checks = evaluate_operations(&ThresholdPolicy::default(), &table);
        let names: Vec<&str> = checks.iter().map(|c| c.metric_name.as_str()).collect();
        assert_eq!(names, vec!["verification_failure_rate"]);
        assert!(checks[0].passed);
    }

    #[test]
    fn summary_average_counts_as_a_sample() {
        let mut table = OperationTable::default();
        table.kem_encap.set_summary_average(100);
        let checks = evaluate_operations(&ThresholdPolicy::default(), &table);
        let names: Vec<&str> = checks.iter().map(|c| c.metric_name.as_str()).collect();
        assert_eq!(names, vec!["kem_encap_latency_p99_us", "kem_encap_throughput"]);
        assert!(checks.iter().all(|c| c.passed), "{checks:?}");
    }

    #[test]
    fn throughput_is_a_lower_bound() {
        let mut table = OperationTable::default();
        table.kem_decap.latency_samples = vec![400];
        let checks = evaluate_operations(&ThresholdPolicy::default(), &table);
        let throughput = checks
            .iter()
            .find(|c| c.metric_name == "kem_decap_throughput")
            .unwrap();
        assert!(!throughput.passed);
        assert!((throughput.actual_value - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn invite_success_rate() {
        let mut table = OperationTable::default();
        table.invites.accepted = 90;
        table.invites.failed = 10;
        let checks = evaluate_operations(&ThresholdPolicy::default(), &table);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].metric_name, "invite_success_rate");
        assert!(!checks[0].passed, "0.9 is below 0.95");
    }

    #[test]
    fn custom_category_reads_other_bucket() {
        let mut table = OperationTable::default();
        let route = table.operation_mut("route");
        route.record_successes(8);
        route.record_failures(2);
        let policy = policy(
            "route",
            OperationBounds {
                failure_rate_max: Some(0.1),
                success_rate_min: Some(0.5),
                ..OperationBounds::default()
            },
        );
        let checks = evaluate_operations(&policy, &table);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].metric_name, "route_failure_rate");
        assert!(!checks[0].passed);
        assert_eq!(checks[1].metric_name, "route_success_rate");
        assert!(checks[1].passed);

        let missing = evaluate_operations(
            &policy_for_missing_operation(),
            &OperationTable::default(),
        );
        assert!(missing.is_empty());
    }

    fn policy_for_missing_operation() -> ThresholdPolicy {
        policy(
            "gossip",
            OperationBounds {
                failure_rate_max: Some(0.1),
                ..OperationBounds::default()
            },
        )
    }

    #[test]
    fn metric_bounds_only_for_existing_metrics() {
        let mut policy = ThresholdPolicy::empty();
        policy.metrics.insert(
            "delivery_rate".to_owned(),
            MetricBounds {
                min: Some(90.0),
                max: Some(100.0),
            },
        );
        policy.metrics.insert(
            "absent".to_owned(),
            MetricBounds {
                min: Some(1.0),
                max: None,
            },
        );
        let mut metrics = BTreeMap::new();
        metrics.insert("delivery_rate".to_owned(), 85.0);
        let checks = evaluate_metrics(&policy, &metrics);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].metric_name, "delivery_rate_min");
        assert!(!checks[0].passed);
        assert_eq!(checks[1].metric_name, "delivery_rate_max");
        assert!(checks[1].passed);
    }

    #[test]
    fn folding_checks() {
        let pass = ThresholdCheck::at_least("a".to_owned(), 1.0, 2.0);
        let fail = ThresholdCheck::at_most("b".to_owned(), 1.0, 2.0);
        let mut verdict = Verdict::Unknown;
        fold_checks(&mut verdict, &[]);
        assert_eq!(verdict, Verdict::Unknown);
        fold_checks(&mut verdict, std::slice::from_ref(&pass));
        assert_eq!(verdict, Verdict::Pass);
        fold_checks(&mut verdict, &[fail, pass]);
        assert_eq!(verdict, Verdict::Fail);
    }
}
