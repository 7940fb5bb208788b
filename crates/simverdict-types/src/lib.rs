//! Shared data model for the simverdict workspace.
//!
//! [`LogEvent`] is the normalized form of one structured log line,
//! [`FieldValue`] the scalar carried in its payload, and [`Verdict`] the
//! tri-state outcome attached to scenario runs and reports.

pub mod event;
pub mod value;
pub mod verdict;

pub use event::{Level, LogEvent, Timestamp};
pub use value::{FieldMap, FieldValue, flatten_object};
pub use verdict::Verdict;
