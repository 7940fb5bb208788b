//! Analyzer configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use simverdict_error::{Result, VerdictError};

/// Heuristics that turn failed runs into recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecommendationRules {
    /// A failed run with more ERROR events than this is flagged.
    pub max_errors: u64,
    /// A failed run whose `delivery_rate` metric is below this is flagged.
    pub min_delivery_rate: f64,
    /// A failed run whose `avg_latency_ms` metric is above this is flagged.
    pub max_avg_latency_ms: f64,
}

impl Default for RecommendationRules {
    fn default() -> Self {
        Self {
            max_errors: 10,
            min_delivery_rate: 90.0,
            max_avg_latency_ms: 1000.0,
        }
    }
}

/// Knobs for a single analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Upper bound on samples synthesized from one summary line.
    pub synthesized_sample_cap: usize,
    /// ERROR/WARN excerpts kept per run.
    pub excerpt_limit: usize,
    /// Malformed-line records kept in diagnostics (all are still counted).
    pub malformed_line_limit: usize,
    /// Treat runs that never received a verdict signal as failures.
    pub unknown_is_failure: bool,
    pub recommendations: RecommendationRules,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            synthesized_sample_cap: 100,
            excerpt_limit: 10,
            malformed_line_limit: 100,
            unknown_is_failure: false,
            recommendations: RecommendationRules::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Read a JSON config file. Omitted keys keep their defaults; unknown
    /// keys are rejected. The result is validated.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|err| VerdictError::InvalidConfig {
            detail: format!("{}: {err}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful report.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.synthesized_sample_cap == 0 {
            errors.push("synthesized_sample_cap must be > 0".to_owned());
        }
        let rules = &self.recommendations;
        if !rules.min_delivery_rate.is_finite() || rules.min_delivery_rate < 0.0 {
            errors.push("recommendations.min_delivery_rate must be finite and >= 0".to_owned());
        }
        if !rules.max_avg_latency_ms.is_finite() || rules.max_avg_latency_ms < 0.0 {
            errors.push("recommendations.max_avg_latency_ms must be finite and >= 0".to_owned());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(VerdictError::InvalidConfig {
                detail: errors.join("; "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.synthesized_sample_cap, 100);
        assert_eq!(config.excerpt_limit, 10);
        assert_eq!(config.malformed_line_limit, 100);
        assert!(!config.unknown_is_failure);
        assert_eq!(config.recommendations.max_errors, 10);
        config.validate().unwrap();
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzer.json");
        std::fs::write(
            &path,
            r#"{"excerpt_limit": 3, "recommendations": {"max_errors": 2}}"#,
        )
        .unwrap();
        let config = AnalyzerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.excerpt_limit, 3);
        assert_eq!(config.recommendations.max_errors, 2);
        assert_eq!(config.synthesized_sample_cap, 100);
        assert!((config.recommendations.min_delivery_rate - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn config_file_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzer.json");
        std::fs::write(&path, r#"{"excerpt_limt": 3}"#).unwrap();
        let err = AnalyzerConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, VerdictError::InvalidConfig { .. }), "{err:?}");
        assert!(err.to_string().contains("excerpt_limt"), "{err}");
    }

    #[test]
    fn zero_sample_cap_is_rejected() {
        let config = AnalyzerConfig {
            synthesized_sample_cap: 0,
            ..AnalyzerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("synthesized_sample_cap"), "{err}");
    }

    #[test]
    fn non_finite_rule_is_rejected() {
        let mut config = AnalyzerConfig::default();
        config.recommendations.max_avg_latency_ms = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(VerdictError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"unknown_is_failure": true, "recommendations": {"max_errors": 3}}"#)
                .unwrap();
        assert!(config.unknown_is_failure);
        assert_eq!(config.recommendations.max_errors, 3);
        assert_eq!(config.excerpt_limit, 10);
    }
}
