//! Injected observability for the computation core.
//!
//! Every component takes a `&mut dyn Recorder` instead of reaching for a
//! process-wide logger. Failures local to one entity or one month-end are
//! tallied here as [`Degradation`]s so callers can see how many rows came
//! back as `None`.

use std::collections::BTreeMap;
use std::fmt;

use log::Level;
use serde::{Deserialize, Serialize};

/// Kinds of row-level degradation. None of these abort a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    /// Cash flow and date sequences of different length fed to the solver.
    DimensionMismatch,
    /// Cash flows without both a positive and a negative value.
    InvalidCashflowSet,
    /// Root-finder overflowed, diverged, or ran out of iterations.
    NonConvergence,
    /// No curve point for a (curve, month-end) pair.
    UnmatchedCurveRate,
    /// No ledger row carries a value for a grouping column.
    MissingGroupColumn,
    /// MOIC requested with zero paid-in capital.
    UndefinedMoic,
    /// Financing position without an exit date and no reporting cutoff.
    OpenPosition,
    /// Contribution row without fund leverage terms attached.
    MissingLeverageTerms,
    /// Financing fee with no amount (unpriced month), left out of the ledger.
    UnpricedFee,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::DimensionMismatch => "dimension_mismatch",
            Degradation::InvalidCashflowSet => "invalid_cashflow_set",
            Degradation::NonConvergence => "non_convergence",
            Degradation::UnmatchedCurveRate => "unmatched_curve_rate",
            Degradation::MissingGroupColumn => "missing_group_column",
            Degradation::UndefinedMoic => "undefined_moic",
            Degradation::OpenPosition => "open_position",
            Degradation::MissingLeverageTerms => "missing_leverage_terms",
            Degradation::UnpricedFee => "unpriced_fee",
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running tally of degraded rows, keyed by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DegradationCounts(BTreeMap<Degradation, usize>);

impl DegradationCounts {
    pub fn add(&mut self, kind: Degradation, count: usize) {
        if count > 0 {
            *self.0.entry(kind).or_insert(0) += count;
        }
    }

    pub fn get(&self, kind: Degradation) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Degradation, usize)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Counts added after `baseline` was taken from the same tally.
    pub fn since(&self, baseline: &DegradationCounts) -> DegradationCounts {
        let mut out = DegradationCounts::default();
        for (kind, count) in self.iter() {
            out.add(kind, count.saturating_sub(baseline.get(kind)));
        }
        out
    }

    /// One human-readable line per degradation kind.
    pub fn summary_lines(&self) -> Vec<String> {
        self.iter()
            .map(|(kind, count)| format!("{count} row(s) degraded: {kind}"))
            .collect()
    }
}

/// Observability collaborator passed into every component call.
pub trait Recorder {
    fn note(&mut self, level: Level, message: &str);

    fn degraded(&mut self, kind: Degradation, count: usize, context: &str);

    fn counts(&self) -> &DegradationCounts;

    fn info(&mut self, message: &str) {
        self.note(Level::Info, message);
    }

    fn debug(&mut self, message: &str) {
        self.note(Level::Debug, message);
    }

    fn warn(&mut self, message: &str) {
        self.note(Level::Warn, message);
    }
}

/// Forwards to the `log` facade and keeps degradation counts.
#[derive(Debug, Default)]
pub struct LogRecorder {
    counts: DegradationCounts,
}

impl LogRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Recorder for LogRecorder {
    fn note(&mut self, level: Level, message: &str) {
        log::log!(target: "credit_perf", level, "{message}");
    }

    fn degraded(&mut self, kind: Degradation, count: usize, context: &str) {
        if count == 0 {
            return;
        }
        self.counts.add(kind, count);
        log::warn!(target: "credit_perf", "{context}: {count} row(s) degraded ({kind})");
    }

    fn counts(&self) -> &DegradationCounts {
        &self.counts
    }
}

/// Keeps every message in memory. Used by tests and embedders that want
/// to inspect what happened without a logger installed.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    pub messages: Vec<(Level, String)>,
    counts: DegradationCounts,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages.iter().any(|(_, m)| m.contains(needle))
    }
}

impl Recorder for MemoryRecorder {
    fn note(&mut self, level: Level, message: &str) {
        self.messages.push((level, message.to_string()));
    }

    fn degraded(&mut self, kind: Degradation, count: usize, context: &str) {
        if count == 0 {
            return;
        }
        self.counts.add(kind, count);
        self.messages
            .push((Level::Warn, format!("{context}: {count} row(s) degraded ({kind})")));
    }

    fn counts(&self) -> &DegradationCounts {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate_per_kind() {
        let mut rec = MemoryRecorder::new();
        rec.degraded(Degradation::UnmatchedCurveRate, 2, "expand");
        rec.degraded(Degradation::UnmatchedCurveRate, 1, "expand");
        rec.degraded(Degradation::NonConvergence, 1, "xirr");
        assert_eq!(rec.counts().get(Degradation::UnmatchedCurveRate), 3);
        assert_eq!(rec.counts().total(), 4);
        assert!(rec.contains("unmatched_curve_rate"));
    }

    #[test]
    fn test_zero_count_is_ignored() {
        let mut rec = MemoryRecorder::new();
        rec.degraded(Degradation::OpenPosition, 0, "positions");
        assert!(rec.counts().is_empty());
        assert!(rec.messages.is_empty());
    }

    #[test]
    fn test_since_reports_only_new_counts() {
        let mut rec = MemoryRecorder::new();
        rec.degraded(Degradation::OpenPosition, 2, "positions");
        let baseline = rec.counts().clone();
        rec.degraded(Degradation::OpenPosition, 1, "positions");
        rec.degraded(Degradation::UnpricedFee, 4, "inject");

        let delta = rec.counts().since(&baseline);
        assert_eq!(delta.get(Degradation::OpenPosition), 1);
        assert_eq!(delta.get(Degradation::UnpricedFee), 4);
        assert_eq!(delta.total(), 5);
        assert!(rec.counts().since(rec.counts()).is_empty());
    }
}
