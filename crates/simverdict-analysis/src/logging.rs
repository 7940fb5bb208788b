//! Diagnostic logging for simverdict itself.
//!
//! Human-readable compact output goes to stderr (stdout carries the report).
//! With a log directory, every event is also written as JSON lines to
//! `<dir>/simverdict.log.jsonl` for post-hoc inspection.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use simverdict_error::{Result, VerdictError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// File name of the JSON-lines log inside the log directory.
pub const LOG_FILE_NAME: &str = "simverdict.log.jsonl";

/// Returned by [`init_logging`]; keep it alive until exit.
#[derive(Debug)]
pub struct LogGuard {
    /// Path of the JSON-lines log, when one was requested.
    pub log_path: Option<PathBuf>,
}

/// `MakeWriter` over a shared file handle; each event locks, writes, unlocks.
#[derive(Clone)]
struct SharedFileWriter {
    file: Arc<Mutex<File>>,
}

impl SharedFileWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileGuard {
            guard: self.file.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

struct SharedFileGuard<'a> {
    guard: MutexGuard<'a, File>,
}

impl Write for SharedFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.guard.flush()
    }
}

fn default_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber.
///
/// `verbose` lowers the default filter from INFO to DEBUG; `RUST_LOG`
/// overrides either. Fails if a global subscriber is already installed.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<LogGuard> {
    let (json_layer, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_path = dir.join(LOG_FILE_NAME);
            let writer = SharedFileWriter::new(File::create(&log_path)?);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true);
            (Some(layer), Some(log_path))
        }
        None => (None, None),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(terminal_layer)
        .with(json_layer)
        .try_init()
        .map_err(|err| VerdictError::internal(format!("logging already initialized: {err}")))?;

    Ok(LogGuard { log_path })
}

/// Terminal-only logging for tests; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_test_writer()
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyzerConfig;
    use crate::pipeline::Analyzer;
    use crate::policy::ThresholdPolicy;

    fn scoped_json_subscriber(log_path: &Path, filter: &str) -> impl tracing::Subscriber + Send + Sync {
        let writer = SharedFileWriter::new(File::create(log_path).unwrap());
        tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true),
            )
    }

    fn json_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).unwrap_or_else(|e| panic!("bad log line {line}: {e}")))
            .collect()
    }

    #[test]
    fn malformed_lines_are_logged_with_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join(LOG_FILE_NAME);
        let subscriber = scoped_json_subscriber(&log_path, "info");

        tracing::subscriber::with_default(subscriber, || {
            let analyzer =
                Analyzer::new(AnalyzerConfig::default(), ThresholdPolicy::default()).unwrap();
            analyzer
                .analyze_str("{\"scenario\":\"a\"}\nnot json\n")
                .unwrap();
        });

        let events = json_lines(&log_path);
        let malformed = events
            .iter()
            .find(|e| e["fields"]["message"] == "skipping malformed log line")
            .expect("malformed line should be logged");
        assert_eq!(malformed["level"], "WARN");
        assert_eq!(malformed["fields"]["line"], 2);
        assert_eq!(malformed["fields"]["source"], "<memory>");
        assert!(
            events
                .iter()
                .any(|e| e["fields"]["message"] == "report assembled"),
            "report summary should be logged: {events:?}"
        );
    }

    #[test]
    fn debug_events_are_filtered_at_info() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join(LOG_FILE_NAME);
        let subscriber = scoped_json_subscriber(&log_path, "info");

        tracing::subscriber::with_default(subscriber, || {
            let analyzer =
                Analyzer::new(AnalyzerConfig::default(), ThresholdPolicy::default()).unwrap();
            analyzer
                .analyze_str("{\"scenario\":\"a\"}\n{\"scenario\":\"b\"}\n")
                .unwrap();
        });

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("log input analyzed"));
        assert!(
            !content.contains("scenario run opened"),
            "run transitions are DEBUG and must be filtered"
        );
    }

    #[test]
    fn debug_filter_shows_run_transitions() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join(LOG_FILE_NAME);
        let subscriber = scoped_json_subscriber(&log_path, "debug");

        tracing::subscriber::with_default(subscriber, || {
            let analyzer =
                Analyzer::new(AnalyzerConfig::default(), ThresholdPolicy::default()).unwrap();
            analyzer
                .analyze_str("{\"scenario\":\"a\"}\n{\"scenario\":\"b\"}\n")
                .unwrap();
        });

        let opened: Vec<_> = json_lines(&log_path)
            .into_iter()
            .filter(|e| e["fields"]["message"] == "scenario run opened")
            .map(|e| e["fields"]["scenario"].as_str().unwrap_or_default().to_owned())
            .collect();
        assert_eq!(opened, vec!["a", "b"]);
    }

    #[test]
    fn test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
        tracing::info!(check = "idempotent", "test logging initialized twice");
    }
}
