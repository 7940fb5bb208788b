//! Per-operation metric accumulation.
//!
//! An [`OperationTable`] is owned by every scenario run and by the global
//! context. Events feed it through [`OperationTable::record_event`]; summary
//! statistics ([`LatencyMetrics`]) are derived on demand and never stored.
//!
//! Counters are merged with max-of-old-and-new: the simulation restates its
//! cumulative totals on every summary line, so the largest value seen is the
//! current one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use simverdict_types::LogEvent;

// ---------------------------------------------------------------------------
// Latency statistics
// ---------------------------------------------------------------------------

/// Summary statistics over a set of latency samples, all in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub count: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub max_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub mean_us: f64,
    /// `1_000_000 / mean_us`, or 0 when the mean is 0.
    pub throughput_ops_per_sec: f64,
}

impl LatencyMetrics {
    /// Compute statistics over `samples` (any order).
    ///
    /// An empty slice yields all zeros.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let count = sorted.len() as u64;
        let total_us = sorted.iter().fold(0_u64, |acc, &v| acc.saturating_add(v));
        let total_exact: u128 = sorted.iter().map(|&v| u128::from(v)).sum();
        let mean_us = total_exact as f64 / count as f64;
        let throughput_ops_per_sec = if mean_us > 0.0 {
            1_000_000.0 / mean_us
        } else {
            0.0
        };

        Self {
            count,
            total_us,
            min_us: sorted[0],
            max_us: sorted[sorted.len() - 1],
            p50_us: percentile(&sorted, 50),
            p95_us: percentile(&sorted, 95),
            p99_us: percentile(&sorted, 99),
            mean_us,
            throughput_ops_per_sec,
        }
    }
}

/// Nearest-rank percentile over an ascending slice.
///
/// The index is `floor(len * pct / 100)` clamped to the last element, so
/// p50 of `1..=100` is 51 and p99 is 100. Returns 0 for an empty slice.
#[must_use]
pub fn percentile(sorted: &[u64], pct: u32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let pct = usize::try_from(pct).map_or(100, |value| value.min(100));
    let idx = sorted.len().saturating_mul(pct) / 100;
    sorted[idx.min(sorted.len() - 1)]
}

// ---------------------------------------------------------------------------
// Operation accumulator
// ---------------------------------------------------------------------------

/// Accumulator for one operation within a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub latency_samples: Vec<u64>,
    /// How many of `latency_samples` were synthesized from a summary average.
    pub synthesized_samples: u64,
    /// Average reported by a completion summary. Stands in as a single
    /// sample only when no samples were collected.
    pub summary_average_us: Option<u64>,
}

impl OperationMetrics {
    pub fn record_successes(&mut self, count: u64) {
        self.success_count = self.success_count.max(count);
    }

    pub fn record_failures(&mut self, count: u64) {
        self.failure_count = self.failure_count.max(count);
    }

    pub fn add_sample(&mut self, latency_us: u64) {
        self.latency_samples.push(latency_us);
    }

    /// Approximate a summary line (`count` operations at `average_us`) with
    /// `min(count, cap)` identical samples.
    pub fn add_synthesized(&mut self, count: u64, average_us: u64, cap: usize) {
        let n = usize::try_from(count).map_or(cap, |count| count.min(cap));
        self.latency_samples
            .extend(std::iter::repeat_n(average_us, n));
        self.synthesized_samples += n as u64;
    }

    /// Record a completion-summary average. Non-positive values are ignored
    /// and the first recorded average wins.
    pub fn set_summary_average(&mut self, average_us: u64) {
        if average_us > 0 && self.summary_average_us.is_none() {
            self.summary_average_us = Some(average_us);
        }
    }

    /// Whether anything at all was recorded for this operation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.success_count > 0
            || self.failure_count > 0
            || !self.latency_samples.is_empty()
            || self.summary_average_us.is_some()
    }

    /// Whether the summary average is standing in for real samples.
    #[must_use]
    pub fn uses_summary_average(&self) -> bool {
        self.latency_samples.is_empty() && self.summary_average_us.is_some()
    }

    #[must_use]
    pub fn latency(&self) -> LatencyMetrics {
        match self.summary_average_us {
            Some(average) if self.latency_samples.is_empty() => {
                LatencyMetrics::from_samples(&[average])
            }
            _ => LatencyMetrics::from_samples(&self.latency_samples),
        }
    }

    /// `failures / (successes + failures)`; `None` when nothing was counted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> Option<f64> {
        let total = self.success_count.saturating_add(self.failure_count);
        (total > 0).then(|| self.failure_count as f64 / total as f64)
    }

    /// `successes / (successes + failures)`; `None` when nothing was counted.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        self.failure_rate().map(|rate| 1.0 - rate)
    }

    /// Fold a later accumulator for the same operation into this one.
    pub fn merge(&mut self, later: &Self) {
        self.record_successes(later.success_count);
        self.record_failures(later.failure_count);
        self.latency_samples
            .extend_from_slice(&later.latency_samples);
        self.synthesized_samples += later.synthesized_samples;
        if self.summary_average_us.is_none() {
            self.summary_average_us = later.summary_average_us;
        }
    }

    #[must_use]
    pub fn summary(&self) -> OperationSummary {
        OperationSummary {
            success_count: self.success_count,
            failure_count: self.failure_count,
            failure_rate: self.failure_rate(),
            latency: self.latency(),
            synthesized_samples: self.synthesized_samples,
            summary_average_used: self.uses_summary_average(),
        }
    }
}

/// Derived, report-ready view of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub success_count: u64,
    pub failure_count: u64,
    pub failure_rate: Option<f64>,
    pub latency: LatencyMetrics,
    /// Samples approximated from summary averages rather than observed.
    pub synthesized_samples: u64,
    /// Latency statistics come from a single completion-summary average.
    pub summary_average_used: bool,
}

// ---------------------------------------------------------------------------
// Invites
// ---------------------------------------------------------------------------

/// Cumulative invite counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InviteCounters {
    pub created: u64,
    pub accepted: u64,
    pub failed: u64,
}

impl InviteCounters {
    /// `accepted / (accepted + failed)`; `None` when neither was counted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.accepted.saturating_add(self.failed);
        (total > 0).then(|| self.accepted as f64 / total as f64)
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.created > 0 || self.accepted > 0 || self.failed > 0
    }

    pub fn merge(&mut self, later: &Self) {
        self.created = self.created.max(later.created);
        self.accepted = self.accepted.max(later.accepted);
        self.failed = self.failed.max(later.failed);
    }

    #[must_use]
    pub fn summary(&self) -> InviteSummary {
        InviteSummary {
            created: self.created,
            accepted: self.accepted,
            failed: self.failed,
            success_rate: self.success_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InviteSummary {
    pub created: u64,
    pub accepted: u64,
    pub failed: u64,
    pub success_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// Operation table
// ---------------------------------------------------------------------------

/// Fixed operation slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationSlot {
    Sign,
    Verify,
    KemEncap,
    KemDecap,
}

impl OperationSlot {
    pub const ALL: [Self; 4] = [Self::Sign, Self::Verify, Self::KemEncap, Self::KemDecap];

    /// Map an operation name as written by the simulation onto a slot.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sign" => Some(Self::Sign),
            "verify" => Some(Self::Verify),
            "encapsulate" | "kem_encap" => Some(Self::KemEncap),
            "decapsulate" | "kem_decap" => Some(Self::KemDecap),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::KemEncap => "kem_encap",
            Self::KemDecap => "kem_decap",
        }
    }
}

impl fmt::Display for OperationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative counter keys and the slot counter each one restates.
const CUMULATIVE_COUNTERS: [(&str, OperationSlot, CounterKind); 6] = [
    ("total_signatures_created", OperationSlot::Sign, CounterKind::Success),
    ("total_signatures_verified", OperationSlot::Verify, CounterKind::Success),
    ("signature_failures", OperationSlot::Verify, CounterKind::Failure),
    ("total_kem_encapsulations", OperationSlot::KemEncap, CounterKind::Success),
    ("total_kem_decapsulations", OperationSlot::KemDecap, CounterKind::Success),
    ("kem_failures", OperationSlot::KemDecap, CounterKind::Failure),
];

const AVERAGE_FALLBACKS: [(&str, OperationSlot); 4] = [
    ("avg_sign_latency_us", OperationSlot::Sign),
    ("avg_verify_latency_us", OperationSlot::Verify),
    ("avg_encap_latency_us", OperationSlot::KemEncap),
    ("avg_decap_latency_us", OperationSlot::KemDecap),
];

#[derive(Debug, Clone, Copy)]
enum CounterKind {
    Success,
    Failure,
}

/// Typed per-operation accumulators for one run (or the whole analysis).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationTable {
    pub sign: OperationMetrics,
    pub verify: OperationMetrics,
    pub kem_encap: OperationMetrics,
    pub kem_decap: OperationMetrics,
    pub invites: InviteCounters,
    /// Operations outside the fixed slots, keyed by their logged name.
    pub other: BTreeMap<String, OperationMetrics>,
}

impl OperationTable {
    #[must_use]
    pub const fn slot(&self, slot: OperationSlot) -> &OperationMetrics {
        match slot {
            OperationSlot::Sign => &self.sign,
            OperationSlot::Verify => &self.verify,
            OperationSlot::KemEncap => &self.kem_encap,
            OperationSlot::KemDecap => &self.kem_decap,
        }
    }

    pub const fn slot_mut(&mut self, slot: OperationSlot) -> &mut OperationMetrics {
        match slot {
            OperationSlot::Sign => &mut self.sign,
            OperationSlot::Verify => &mut self.verify,
            OperationSlot::KemEncap => &mut self.kem_encap,
            OperationSlot::KemDecap => &mut self.kem_decap,
        }
    }

    /// Look an operation up by logged name (slot aliases included).
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationMetrics> {
        match OperationSlot::from_name(name) {
            Some(slot) => Some(self.slot(slot)),
            None => self.other.get(name),
        }
    }

    /// Accumulator for a logged operation name, creating an `other` entry
    /// when the name is not a fixed slot.
    pub fn operation_mut(&mut self, name: &str) -> &mut OperationMetrics {
        match OperationSlot::from_name(name) {
            Some(slot) => self.slot_mut(slot),
            None => self.other.entry(name.to_owned()).or_default(),
        }
    }

    /// Feed one event's payload into the table.
    ///
    /// Returns whether the event carried any operation metric.
    pub fn record_event(&mut self, event: &LogEvent, synthesized_cap: usize) -> bool {
        let mut recorded = self.record_operation_line(event, synthesized_cap);

        for (key, slot, kind) in CUMULATIVE_COUNTERS {
            if let Some(value) = event.payload_u64(key) {
                let metrics = self.slot_mut(slot);
                match kind {
                    CounterKind::Success => metrics.record_successes(value),
                    CounterKind::Failure => metrics.record_failures(value),
                }
                recorded = true;
            }
        }

        if let Some(created) = event.payload_u64("invites_created") {
            self.invites.created = self.invites.created.max(created);
            recorded = true;
        }
        if let Some(accepted) = event.payload_u64("invites_accepted") {
            self.invites.accepted = self.invites.accepted.max(accepted);
            recorded = true;
        }
        if let Some(failed) = event.payload_u64("invites_failed") {
            self.invites.failed = self.invites.failed.max(failed);
            recorded = true;
        }

        for (key, slot) in AVERAGE_FALLBACKS {
            if let Some(average) = event.payload_u64(key) {
                self.slot_mut(slot).set_summary_average(average);
                recorded = true;
            }
        }

        recorded
    }

    /// `operation` lines: either a summary (`count` + `latency_avg_us`) or an
    /// individual observation (`latency_us`).
    fn record_operation_line(&mut self, event: &LogEvent, synthesized_cap: usize) -> bool {
        let Some(name) = event.fields.get("operation").and_then(|v| v.as_str()) else {
            return false;
        };
        if name.is_empty() {
            return false;
        }
        let count = event.payload_u64("count").filter(|&count| count > 0);
        let average = event.payload_u64("latency_avg_us");
        let failures = event
            .payload_u64("failures")
            .or_else(|| event.payload_u64("failure_count"));
        let latency = event.payload_u64("latency_us");
        if count.is_none() && failures.is_none() && latency.is_none() {
            return false;
        }

        let metrics = self.operation_mut(name);
        if let Some(count) = count {
            if let Some(average) = average {
                metrics.add_synthesized(count, average, synthesized_cap);
            }
            metrics.record_successes(count);
        }
        if let Some(failures) = failures {
            metrics.record_failures(failures);
        }
        if let Some(latency) = latency {
            metrics.add_sample(latency);
        }
        true
    }

    /// Named view of every active operation, fixed slots first.
    pub fn iter_active(&self) -> impl Iterator<Item = (&str, &OperationMetrics)> {
        OperationSlot::ALL
            .into_iter()
            .map(|slot| (slot.as_str(), self.slot(slot)))
            .chain(self.other.iter().map(|(name, m)| (name.as_str(), m)))
            .filter(|(_, metrics)| metrics.is_active())
    }

    /// Report-ready statistics for every active operation.
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, OperationSummary> {
        self.iter_active()
            .map(|(name, metrics)| (name.to_owned(), metrics.summary()))
            .collect()
    }

    /// Successful operations across every slot and the `other` bucket.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        OperationSlot::ALL
            .into_iter()
            .map(|slot| self.slot(slot).success_count)
            .chain(self.other.values().map(|m| m.success_count))
            .fold(0, u64::saturating_add)
    }

    /// Fold a later table into this one.
    pub fn merge(&mut self, later: &Self) {
        for slot in OperationSlot::ALL {
            self.slot_mut(slot).merge(later.slot(slot));
        }
        self.invites.merge(&later.invites);
        for (name, metrics) in &later.other {
            self.other.entry(name.clone()).or_default().merge(metrics);
        }
    }
}
