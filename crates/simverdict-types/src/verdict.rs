use std::fmt;

use serde::{Deserialize, Serialize};

/// Tri-state outcome of a scenario run or of a whole report.
///
/// Starts [`Verdict::Unknown`]. A failure moves it to [`Verdict::Fail`]
/// permanently; a passing signal moves `Unknown` to [`Verdict::Pass`] but
/// never overrides `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Unknown,
    Pass,
    Fail,
}

impl Verdict {
    /// Fold in a passing signal.
    pub fn record_pass(&mut self) {
        if *self == Self::Unknown {
            *self = Self::Pass;
        }
    }

    /// Fold in a failing signal.
    pub fn record_failure(&mut self) {
        *self = Self::Fail;
    }

    /// Fold in one signal.
    pub fn record(&mut self, passed: bool) {
        if passed {
            self.record_pass();
        } else {
            self.record_failure();
        }
    }

    /// Combine two independently folded verdicts.
    ///
    /// Associative and commutative, so partial results can be merged in any
    /// order.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Fail, _) | (_, Self::Fail) => Self::Fail,
            (Self::Pass, _) | (_, Self::Pass) => Self::Pass,
            (Self::Unknown, Self::Unknown) => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }

    #[must_use]
    pub const fn is_fail(self) -> bool {
        matches!(self, Self::Fail)
    }

    /// Stable string identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
