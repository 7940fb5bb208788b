use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for simverdict operations.
///
/// Parsing-level failures ([`VerdictError::MalformedLine`]) are always
/// recovered locally by the caller; discovery and configuration failures are
/// fatal and surface to the process boundary. Threshold breaches are never
/// errors: they are reported as failed checks.
#[derive(Error, Debug)]
pub enum VerdictError {
    // === Input Errors ===
    /// A log line failed structural parsing.
    #[error("malformed log line {line}: {detail}")]
    MalformedLine { line: usize, detail: String },

    /// An input log file does not exist or is not a regular file.
    #[error("input log file not found: '{path}'")]
    MissingInputFile { path: PathBuf },

    /// Input discovery produced no log files.
    #[error("no log files matched '{pattern}'")]
    NoMatchingFiles { pattern: String },

    // === Configuration Errors ===
    /// The threshold policy could not be read or failed validation.
    #[error("invalid threshold policy ({source_name}): {detail}")]
    InvalidThresholdPolicy { source_name: String, detail: String },

    /// The analyzer configuration is internally inconsistent.
    #[error("invalid analyzer configuration: {detail}")]
    InvalidConfig { detail: String },

    // === I/O Errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report or policy serialization failed.
    #[error("serialization failed: {detail}")]
    Serialization { detail: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error classes reported in diagnostics and on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A single line could not be parsed.
    Malformed,
    /// The analysis input could not be located.
    Input,
    /// Policy or analyzer configuration is invalid.
    Config,
    /// Filesystem failure.
    Io,
    /// Serialization failure.
    Format,
    /// Internal logic error.
    Internal,
}

impl ErrorCode {
    /// Stable string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Input => "input",
            Self::Config => "config",
            Self::Io => "io",
            Self::Format => "format",
            Self::Internal => "internal",
        }
    }
}

/// Process exit code when every verdict passes.
pub const EXIT_PASS: i32 = 0;
/// Process exit code when at least one verdict failed (or stayed unknown).
pub const EXIT_FAIL: i32 = 1;
/// Process exit code for usage errors and fatal analysis errors.
pub const EXIT_FATAL: i32 = 2;

impl VerdictError {
    /// Classify this error.
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MalformedLine { .. } => ErrorCode::Malformed,
            Self::MissingInputFile { .. } | Self::NoMatchingFiles { .. } => ErrorCode::Input,
            Self::InvalidThresholdPolicy { .. } | Self::InvalidConfig { .. } => ErrorCode::Config,
            Self::Io(_) => ErrorCode::Io,
            Self::Serialization { .. } => ErrorCode::Format,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this error must abort the analysis.
    ///
    /// Only malformed lines are recoverable; everything else stops the run
    /// before a report is produced.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedLine { .. })
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingInputFile { .. } => Some("Check the input path or run the simulation first"),
            Self::NoMatchingFiles { .. } => {
                Some("Point --input at a .jsonl file or a directory containing .jsonl files")
            }
            Self::InvalidThresholdPolicy { .. } => {
                Some("Fix the policy file or drop --require-thresholds to use the default policy")
            }
            Self::MalformedLine { .. } => Some("The line was skipped; check the log writer"),
            _ => None,
        }
    }

    /// Get the process exit code for this error (for CLI use).
    pub const fn exit_code(&self) -> i32 {
        EXIT_FATAL
    }

    /// Create a malformed-line error.
    pub fn malformed(line: usize, detail: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            detail: detail.into(),
        }
    }

    /// Create a policy error.
    pub fn policy(source_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidThresholdPolicy {
            source_name: source_name.into(),
            detail: detail.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(detail: impl Into<String>) -> Self {
        Self::Serialization {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `VerdictError`.
pub type Result<T> = std::result::Result<T, VerdictError>;
