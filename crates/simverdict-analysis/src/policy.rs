//! Declarative threshold policy.
//!
//! A policy names bounds per operation category plus generic `{min, max}`
//! bounds on scenario metrics. It is validated eagerly when loaded, so the
//! evaluator never sees a negative limit or an out-of-range rate.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use simverdict_error::{Result, VerdictError};
use tracing::{info, warn};

use crate::metrics::OperationSlot;

/// Schema identifier for serialized policies.
pub const POLICY_SCHEMA_VERSION: &str = "simverdict.thresholds.v1";

/// Source name used in diagnostics for the built-in policy.
pub const BUILTIN_POLICY_SOURCE: &str = "built-in default";

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Bounds for one operation category. Absent bounds produce no check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationBounds {
    /// Maximum p99 latency in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_p99_us: Option<f64>,
    /// Minimum throughput in operations per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_min: Option<f64>,
    /// Maximum `failures / (successes + failures)`, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_rate_max: Option<f64>,
    /// Minimum success rate, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate_min: Option<f64>,
}

/// Generic bounds on one scenario metric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// What a policy category is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryTarget<'a> {
    /// One of the fixed operation slots.
    Slot(OperationSlot),
    /// The invite counter block.
    Invites,
    /// An operation outside the fixed slots, by logged name.
    Other(&'a str),
}

/// Category names the policy understands natively.
pub const KNOWN_CATEGORIES: [&str; 5] =
    ["signature", "verification", "kem_encap", "kem_decap", "invite"];

/// Resolve a category name to the accumulator it checks.
#[must_use]
pub fn category_target(category: &str) -> CategoryTarget<'_> {
    match category {
        "signature" => CategoryTarget::Slot(OperationSlot::Sign),
        "verification" => CategoryTarget::Slot(OperationSlot::Verify),
        "kem_encap" => CategoryTarget::Slot(OperationSlot::KemEncap),
        "kem_decap" => CategoryTarget::Slot(OperationSlot::KemDecap),
        "invite" => CategoryTarget::Invites,
        other => CategoryTarget::Other(other),
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Threshold policy: per-category operation bounds plus metric bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdPolicy {
    pub schema_version: String,
    pub operations: BTreeMap<String, OperationBounds>,
    pub metrics: BTreeMap<String, MetricBounds>,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        let mut operations = BTreeMap::new();
        operations.insert(
            "signature".to_owned(),
            OperationBounds {
                latency_p99_us: Some(1000.0),
                throughput_min: Some(1000.0),
                failure_rate_max: Some(0.01),
                success_rate_min: None,
            },
        );
        operations.insert(
            "verification".to_owned(),
            OperationBounds {
                latency_p99_us: Some(500.0),
                throughput_min: Some(2000.0),
                failure_rate_max: Some(0.01),
                success_rate_min: None,
            },
        );
        operations.insert(
            "kem_encap".to_owned(),
            OperationBounds {
                latency_p99_us: Some(200.0),
                throughput_min: Some(5000.0),
                ..OperationBounds::default()
            },
        );
        operations.insert(
            "kem_decap".to_owned(),
            OperationBounds {
                latency_p99_us: Some(200.0),
                throughput_min: Some(5000.0),
                failure_rate_max: Some(0.01),
                success_rate_min: None,
            },
        );
        operations.insert(
            "invite".to_owned(),
            OperationBounds {
                success_rate_min: Some(0.95),
                ..OperationBounds::default()
            },
        );
        Self {
            schema_version: POLICY_SCHEMA_VERSION.to_owned(),
            operations,
            metrics: BTreeMap::new(),
        }
    }
}

impl ThresholdPolicy {
    /// Policy with no bounds at all; every run stays Unknown unless its own
    /// assertions decide it.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            schema_version: POLICY_SCHEMA_VERSION.to_owned(),
            operations: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// Parse and validate a policy document.
    ///
    /// Accepts `operations` plus `metrics` (or its alias `thresholds`), and
    /// known category names directly at the top level.
    pub fn from_json_str(text: &str, source_name: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| VerdictError::policy(source_name, err.to_string()))?;
        Self::from_value(&value, source_name)
    }

    pub fn from_value(value: &Value, source_name: &str) -> Result<Self> {
        let Value::Object(root) = value else {
            return Err(VerdictError::policy(
                source_name,
                "policy document must be a JSON object",
            ));
        };
        let policy = Self::from_object(root)
            .map_err(|detail| VerdictError::policy(source_name, detail))?;
        let errors = validate_policy(&policy);
        if errors.is_empty() {
            Ok(policy)
        } else {
            Err(VerdictError::policy(source_name, errors.join("; ")))
        }
    }

    fn from_object(root: &Map<String, Value>) -> std::result::Result<Self, String> {
        let mut policy = Self::empty();
        for (key, value) in root {
            match key.as_str() {
                "schema_version" => {
                    let version = value
                        .as_str()
                        .ok_or_else(|| "schema_version must be a string".to_owned())?;
                    if version != POLICY_SCHEMA_VERSION {
                        return Err(format!(
                            "unsupported schema_version '{version}', expected '{POLICY_SCHEMA_VERSION}'"
                        ));
                    }
                }
                "operations" => {
                    let operations: BTreeMap<String, OperationBounds> =
                        serde_json::from_value(value.clone())
                            .map_err(|err| format!("operations: {err}"))?;
                    policy.operations.extend(operations);
                }
                "metrics" | "thresholds" => {
                    let metrics: BTreeMap<String, MetricBounds> =
                        serde_json::from_value(value.clone())
                            .map_err(|err| format!("{key}: {err}"))?;
                    policy.metrics.extend(metrics);
                }
                category if KNOWN_CATEGORIES.contains(&category) => {
                    let bounds: OperationBounds = serde_json::from_value(value.clone())
                        .map_err(|err| format!("{category}: {err}"))?;
                    policy.operations.insert(category.to_owned(), bounds);
                }
                unknown => return Err(format!("unknown top-level key '{unknown}'")),
            }
        }
        Ok(policy)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_pretty_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Validate a policy, returning every problem found.
#[must_use]
pub fn validate_policy(policy: &ThresholdPolicy) -> Vec<String> {
    let mut errors = Vec::new();
    for (category, bounds) in &policy.operations {
        if category.trim().is_empty() {
            errors.push("category name must not be empty".to_owned());
        }
        check_limit(&mut errors, category, "latency_p99_us", bounds.latency_p99_us);
        check_limit(&mut errors, category, "throughput_min", bounds.throughput_min);
        check_rate(&mut errors, category, "failure_rate_max", bounds.failure_rate_max);
        check_rate(&mut errors, category, "success_rate_min", bounds.success_rate_min);
        if category_target(category) == CategoryTarget::Invites
            && (bounds.latency_p99_us.is_some()
                || bounds.throughput_min.is_some()
                || bounds.failure_rate_max.is_some())
        {
            errors.push(format!("{category} supports only success_rate_min"));
        }
    }
    for (metric, bounds) in &policy.metrics {
        if metric.trim().is_empty() {
            errors.push("metric name must not be empty".to_owned());
        }
        check_finite(&mut errors, metric, "min", bounds.min);
        check_finite(&mut errors, metric, "max", bounds.max);
        if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
            if min > max {
                errors.push(format!("{metric} min ({min}) exceeds max ({max})"));
            }
        }
    }
    errors
}

fn check_limit(errors: &mut Vec<String>, owner: &str, bound: &str, value: Option<f64>) {
    if let Some(value) = value {
        if !value.is_finite() || value < 0.0 {
            errors.push(format!("{owner} {bound} must be finite and >= 0, got {value}"));
        }
    }
}

/// Scenario metrics may be signed (clock skew, balance deltas).
fn check_finite(errors: &mut Vec<String>, owner: &str, bound: &str, value: Option<f64>) {
    if let Some(value) = value.filter(|v| !v.is_finite()) {
        errors.push(format!("{owner} {bound} must be finite, got {value}"));
    }
}

fn check_rate(errors: &mut Vec<String>, owner: &str, bound: &str, value: Option<f64>) {
    if let Some(value) = value {
        if !(0.0..=1.0).contains(&value) {
            errors.push(format!("{owner} {bound} must be within [0, 1], got {value}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// How to treat an unusable custom policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyLoadMode {
    /// Warn and continue with [`ThresholdPolicy::default`].
    #[default]
    FallbackToDefault,
    /// Fail the analysis.
    Required,
}

/// Load the policy at `path`, or the built-in default when `path` is `None`.
pub fn load_policy(path: Option<&Path>, mode: PolicyLoadMode) -> Result<ThresholdPolicy> {
    load_policy_with_source(path, mode).map(|(policy, _)| policy)
}

/// Like [`load_policy`], also naming where the returned policy came from:
/// the file path, or [`BUILTIN_POLICY_SOURCE`] after a fallback.
pub fn load_policy_with_source(
    path: Option<&Path>,
    mode: PolicyLoadMode,
) -> Result<(ThresholdPolicy, String)> {
    let Some(path) = path else {
        return Ok((ThresholdPolicy::default(), BUILTIN_POLICY_SOURCE.to_owned()));
    };
    let source_name = path.display().to_string();
    let loaded = std::fs::read_to_string(path)
        .map_err(|err| VerdictError::policy(&source_name, err.to_string()))
        .and_then(|text| ThresholdPolicy::from_json_str(&text, &source_name));

    match (loaded, mode) {
        (Ok(policy), _) => {
            info!(
                source = %source_name,
                categories = policy.operations.len(),
                metrics = policy.metrics.len(),
                "threshold policy loaded"
            );
            Ok((policy, source_name))
        }
        (Err(err), PolicyLoadMode::FallbackToDefault) => {
            warn!(
                source = %source_name,
                error = %err,
                "threshold policy unusable; falling back to {BUILTIN_POLICY_SOURCE}"
            );
            Ok((ThresholdPolicy::default(), BUILTIN_POLICY_SOURCE.to_owned()))
        }
        (Err(err), PolicyLoadMode::Required) => Err(err),
    }
}
