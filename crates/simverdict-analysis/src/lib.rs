//! Scenario verdicts from structured simulation logs.
//!
//! Data flows leaf-first through the modules:
//!
//! - [`parser`]: one JSON line into a [`LogEvent`](simverdict_types::LogEvent)
//! - [`scenario`] and [`segmenter`]: events into [`ScenarioRun`]s
//! - [`metrics`]: per-operation latency samples and counters
//! - [`policy`] and [`threshold`]: bounds and the checks they produce
//! - [`report`]: the final [`Report`]
//!
//! [`pipeline::Analyzer`] drives one sequential pass per input and threads an
//! [`AnalysisContext`] through it.
//!
//! ```no_run
//! use simverdict_analysis::{Analyzer, AnalyzerConfig, ThresholdPolicy};
//!
//! let analyzer = Analyzer::new(AnalyzerConfig::default(), ThresholdPolicy::default())?;
//! let report = analyzer.analyze_files(&[std::path::PathBuf::from("logs")])?;
//! println!("{}", report.summary_line());
//! # Ok::<(), simverdict_error::VerdictError>(())
//! ```

pub mod config;
pub mod context;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod scenario;
pub mod segmenter;
pub mod threshold;

pub use config::{AnalyzerConfig, RecommendationRules};
pub use context::{AnalysisContext, Diagnostics, FileDiagnostics, MalformedLineRecord};
pub use metrics::{LatencyMetrics, OperationMetrics, OperationSlot, OperationTable, percentile};
pub use pipeline::{Analyzer, PartialAnalysis, discover_inputs};
pub use policy::{PolicyLoadMode, ThresholdPolicy, load_policy, load_policy_with_source};
pub use report::{Report, ReportSummary, RunReport};
pub use segmenter::{ScenarioRun, Segmenter};
pub use threshold::ThresholdCheck;
