//! Paid-in capital, distributions, MOIC and per-entity XIRR at any rollup
//! level of the facility → deal → fund hierarchy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CreditPerfError;
use crate::ledger::CashflowRecord;
use crate::observe::{Degradation, Recorder};
use crate::time_value;
use crate::types::{Money, Multiple, Rate};
use crate::CreditPerfResult;

/// A grouping column, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupColumn {
    Facility,
    Deal,
    Fund,
}

impl GroupColumn {
    /// Ledger column name.
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupColumn::Facility => "entity_id",
            GroupColumn::Deal => "deal_id",
            GroupColumn::Fund => "fund",
        }
    }

    pub fn value<'a>(&self, row: &'a CashflowRecord) -> Option<&'a str> {
        match self {
            GroupColumn::Facility => row.entity_id.as_deref(),
            GroupColumn::Deal => row.deal_id.as_deref(),
            GroupColumn::Fund => Some(row.fund.as_str()),
        }
    }
}

impl fmt::Display for GroupColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for GroupColumn {
    type Err = CreditPerfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entity_id" | "facility" | "facility_id" => Ok(GroupColumn::Facility),
            "deal_id" | "deal" => Ok(GroupColumn::Deal),
            "fund" => Ok(GroupColumn::Fund),
            other => Err(CreditPerfError::InvalidInput {
                field: "group_column".into(),
                reason: format!("unknown column '{other}'"),
            }),
        }
    }
}

/// Ordered grouping columns for one rollup level. The first column is the
/// entity column used for XIRR; the full list keys the monetary sums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GroupColumn>", into = "Vec<GroupColumn>")]
pub struct GroupKey(Vec<GroupColumn>);

impl GroupKey {
    /// Columns must be non-empty and strictly ascending in hierarchy order.
    pub fn new(columns: Vec<GroupColumn>) -> CreditPerfResult<Self> {
        if columns.is_empty() {
            return Err(CreditPerfError::InvalidInput {
                field: "group_key".into(),
                reason: "at least one grouping column is required".into(),
            });
        }
        if columns.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CreditPerfError::InvalidInput {
                field: "group_key".into(),
                reason: "columns must run facility → deal → fund without repeats".into(),
            });
        }
        Ok(Self(columns))
    }

    pub fn facility() -> Self {
        Self(vec![GroupColumn::Facility, GroupColumn::Deal, GroupColumn::Fund])
    }

    pub fn deal() -> Self {
        Self(vec![GroupColumn::Deal, GroupColumn::Fund])
    }

    pub fn fund() -> Self {
        Self(vec![GroupColumn::Fund])
    }

    pub fn columns(&self) -> &[GroupColumn] {
        &self.0
    }

    pub fn entity(&self) -> GroupColumn {
        self.0[0]
    }

    /// Key values for a row, or `None` if any column is empty on it.
    fn values(&self, row: &CashflowRecord) -> Option<Vec<String>> {
        self.0
            .iter()
            .map(|c| c.value(row).map(str::to_string))
            .collect()
    }

    /// Columns with no value on any ledger row.
    pub fn missing_columns(&self, ledger: &[CashflowRecord]) -> Vec<GroupColumn> {
        self.0
            .iter()
            .copied()
            .filter(|c| ledger.iter().all(|row| c.value(row).is_none()))
            .collect()
    }
}

impl TryFrom<Vec<GroupColumn>> for GroupKey {
    type Error = CreditPerfError;

    fn try_from(columns: Vec<GroupColumn>) -> Result<Self, Self::Error> {
        Self::new(columns)
    }
}

impl From<GroupKey> for Vec<GroupColumn> {
    fn from(key: GroupKey) -> Self {
        key.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.column_name()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Parses a comma-separated column list (`"entity_id,deal_id,fund"`) or one
/// of the level presets `facility`, `deal`, `fund`.
impl FromStr for GroupKey {
    type Err = CreditPerfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facility" => return Ok(Self::facility()),
            "deal" => return Ok(Self::deal()),
            "fund" => return Ok(Self::fund()),
            _ => {}
        }
        let columns = s
            .split(',')
            .map(GroupColumn::from_str)
            .collect::<CreditPerfResult<Vec<_>>>()?;
        Self::new(columns)
    }
}

/// Aggregated metrics for one group value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    /// Values of the group key columns, in key order. Only groups that
    /// exist solely on the XIRR side can carry an empty parent column.
    pub key: Vec<Option<String>>,
    /// Magnitude of total contributions.
    pub paid_in: Money,
    /// Sum of all inflows.
    pub distributed: Money,
    /// `distributed / paid_in`; `None` when nothing was paid in.
    pub moic: Option<Multiple>,
    /// `None` when the solver could not produce a rate.
    pub xirr: Option<Rate>,
}

impl MetricsRow {
    /// Value of the entity (first key) column.
    pub fn entity(&self) -> Option<&str> {
        self.key.first().and_then(|v| v.as_deref())
    }
}

/// Monetary partial aggregate: group values → sum.
pub type Partial = BTreeMap<Vec<String>, Money>;

fn sum_by(key: &GroupKey, ledger: &[CashflowRecord], keep: impl Fn(Money) -> bool) -> Partial {
    let mut out = Partial::new();
    for row in ledger.iter().filter(|r| keep(r.amount)) {
        if let Some(values) = key.values(row) {
            *out.entry(values).or_insert(Decimal::ZERO) += row.amount;
        }
    }
    out
}

/// Paid-in capital per group, reported as a positive magnitude.
pub fn paid_in(key: &GroupKey, ledger: &[CashflowRecord]) -> Partial {
    sum_by(key, ledger, |a| a < Decimal::ZERO)
        .into_iter()
        .map(|(k, v)| (k, -v))
        .collect()
}

/// Distributions (all positive cash flows) per group.
pub fn distributions(key: &GroupKey, ledger: &[CashflowRecord]) -> Partial {
    sum_by(key, ledger, |a| a > Decimal::ZERO)
}

/// Solver boundary: maps every solver error to `None` and records why.
pub fn solve_xirr(
    cashflows: &[Money],
    dates: &[NaiveDate],
    recorder: &mut dyn Recorder,
    context: &str,
) -> Option<Rate> {
    match time_value::xirr(cashflows, dates) {
        Ok(rate) => {
            recorder.debug(&format!("{context}: xirr converged at {}", rate.round_dp(6)));
            Some(rate)
        }
        Err(e) => {
            let kind = match &e {
                CreditPerfError::DimensionMismatch { .. } => Degradation::DimensionMismatch,
                CreditPerfError::InvalidCashflowSet(_) | CreditPerfError::InsufficientData(_) => {
                    Degradation::InvalidCashflowSet
                }
                _ => Degradation::NonConvergence,
            };
            recorder.debug(&format!("{context}: {e}"));
            recorder.degraded(kind, 1, context);
            None
        }
    }
}

/// XIRR for every distinct value of the key's entity column, over that
/// entity's full date-sorted history.
pub fn entity_xirr(
    key: &GroupKey,
    ledger: &[CashflowRecord],
    recorder: &mut dyn Recorder,
) -> BTreeMap<String, Option<Rate>> {
    let entity = key.entity();
    let mut histories: BTreeMap<&str, Vec<(NaiveDate, Money)>> = BTreeMap::new();
    for row in ledger {
        if let Some(value) = entity.value(row) {
            histories.entry(value).or_default().push((row.asof, row.amount));
        }
    }

    histories
        .into_iter()
        .map(|(id, mut flows)| {
            flows.sort_by_key(|(date, _)| *date);
            let (dates, amounts): (Vec<NaiveDate>, Vec<Money>) = flows.into_iter().unzip();
            let context = format!("{entity}={id}");
            let rate = solve_xirr(&amounts, &dates, recorder, &context);
            (id.to_string(), rate)
        })
        .collect()
}

/// Compute paid-in, distributions, MOIC and XIRR for every group of `key`.
///
/// The monetary and XIRR halves are independent: a group present in only one
/// of them still yields a row, with absent sums as zero and absent XIRR as
/// `None`.
pub fn compute_metrics(
    key: &GroupKey,
    ledger: &[CashflowRecord],
    recorder: &mut dyn Recorder,
) -> Vec<MetricsRow> {
    recorder.info(&format!("computing metrics at level {key}"));

    let missing = key.missing_columns(ledger);
    let (paid, distr) = if missing.is_empty() {
        (paid_in(key, ledger), distributions(key, ledger))
    } else {
        let names: Vec<&str> = missing.iter().map(|c| c.column_name()).collect();
        recorder.warn(&format!(
            "missing grouping columns {names:?}; skipping paid-in and distributions"
        ));
        recorder.degraded(Degradation::MissingGroupColumn, missing.len(), "metrics");
        (Partial::new(), Partial::new())
    };

    let xirrs = if missing.contains(&key.entity()) {
        BTreeMap::new()
    } else {
        recorder.info(&format!("IRR calculation starts on the {} level", key.entity()));
        entity_xirr(key, ledger, recorder)
    };

    let group_values: BTreeSet<&Vec<String>> = paid.keys().chain(distr.keys()).collect();
    let mut undefined_moic = 0usize;
    let mut rows: Vec<MetricsRow> = group_values
        .into_iter()
        .map(|values| {
            let paid_in = paid.get(values).copied().unwrap_or(Decimal::ZERO);
            let distributed = distr.get(values).copied().unwrap_or(Decimal::ZERO);
            let moic = moic(paid_in, distributed);
            if moic.is_none() {
                undefined_moic += 1;
            }
            MetricsRow {
                key: values.iter().cloned().map(Some).collect(),
                paid_in,
                distributed,
                moic,
                xirr: xirrs.get(&values[0]).copied().flatten(),
            }
        })
        .collect();

    let seen: BTreeSet<String> = rows
        .iter()
        .filter_map(|r| r.entity().map(str::to_string))
        .collect();
    for (entity, rate) in &xirrs {
        if seen.contains(entity) {
            continue;
        }
        undefined_moic += 1;
        rows.push(MetricsRow {
            key: resolve_key(key, entity, ledger),
            paid_in: Decimal::ZERO,
            distributed: Decimal::ZERO,
            moic: None,
            xirr: *rate,
        });
    }

    rows.sort_by(|a, b| a.key.cmp(&b.key));
    recorder.degraded(Degradation::UndefinedMoic, undefined_moic, "metrics");
    recorder.info(&format!(
        "metrics calculated and merged for {} {key} records",
        rows.len()
    ));
    rows
}

/// `distributed / paid_in`, undefined when nothing was paid in.
pub fn moic(paid_in: Money, distributed: Money) -> Option<Multiple> {
    if paid_in.is_zero() {
        None
    } else {
        distributed.checked_div(paid_in)
    }
}

/// Key values for an entity seen only on the XIRR side, taken from its first
/// ledger row.
fn resolve_key(key: &GroupKey, entity: &str, ledger: &[CashflowRecord]) -> Vec<Option<String>> {
    let first = ledger
        .iter()
        .find(|row| key.entity().value(row) == Some(entity));
    key.columns()
        .iter()
        .map(|c| first.and_then(|row| c.value(row)).map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CashflowType;
    use crate::observe::MemoryRecorder;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(e: &str, deal: &str, fund: &str, date: NaiveDate, t: CashflowType, a: Money) -> CashflowRecord {
        CashflowRecord::facility(e, deal, fund, date, t, a)
    }

    #[test]
    fn test_group_key_validation() {
        assert!(GroupKey::new(vec![]).is_err());
        assert!(GroupKey::new(vec![GroupColumn::Fund, GroupColumn::Deal]).is_err());
        assert!(GroupKey::new(vec![GroupColumn::Deal, GroupColumn::Deal]).is_err());
        assert!(GroupKey::new(vec![GroupColumn::Facility, GroupColumn::Fund]).is_ok());
    }

    #[test]
    fn test_group_key_parse() {
        assert_eq!("facility".parse::<GroupKey>().unwrap(), GroupKey::facility());
        assert_eq!("deal_id, fund".parse::<GroupKey>().unwrap(), GroupKey::deal());
        assert!("fund,deal_id".parse::<GroupKey>().is_err());
        assert!("sector".parse::<GroupKey>().is_err());
    }

    #[test]
    fn test_single_facility_end_to_end() {
        let ledger = vec![
            row("e1", "d1", "f1", d(2023, 1, 1), CashflowType::Contribution, dec!(-1000)),
            row("e1", "d1", "f1", d(2024, 1, 1), CashflowType::ExitFee, dec!(1200)),
        ];
        let mut rec = MemoryRecorder::new();
        let rows = compute_metrics(&GroupKey::facility(), &ledger, &mut rec);
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(
            r.key,
            vec![Some("e1".to_string()), Some("d1".to_string()), Some("f1".to_string())]
        );
        assert_eq!(r.paid_in, dec!(1000));
        assert_eq!(r.distributed, dec!(1200));
        assert_eq!(r.moic, Some(dec!(1.2)));
        let irr = r.xirr.unwrap();
        assert!((irr - dec!(0.20)).abs() < dec!(0.0001), "got {irr}");
        assert!(rec.counts().is_empty());
    }

    #[test]
    fn test_inflow_only_group_keeps_row() {
        let ledger = vec![
            row("e1", "d1", "f1", d(2023, 1, 1), CashflowType::Contribution, dec!(-100)),
            row("e1", "d1", "f1", d(2023, 7, 1), CashflowType::Interest, dec!(110)),
            row("e2", "d2", "f2", d(2023, 7, 1), CashflowType::Interest, dec!(5)),
        ];
        let mut rec = MemoryRecorder::new();
        let rows = compute_metrics(&GroupKey::fund(), &ledger, &mut rec);
        assert_eq!(rows.len(), 2);
        let f2 = rows.iter().find(|r| r.entity() == Some("f2")).unwrap();
        assert_eq!(f2.paid_in, Decimal::ZERO);
        assert_eq!(f2.distributed, dec!(5));
        assert_eq!(f2.moic, None);
        assert_eq!(f2.xirr, None);
        assert_eq!(rec.counts().get(Degradation::UndefinedMoic), 1);
        assert_eq!(rec.counts().get(Degradation::InvalidCashflowSet), 1);
        // MOIC for f1 survives even though f2 failed
        let f1 = rows.iter().find(|r| r.entity() == Some("f1")).unwrap();
        assert_eq!(f1.moic, Some(dec!(1.1)));
        assert!(f1.xirr.is_some());
    }

    #[test]
    fn test_row_count_matches_distinct_funds() {
        let ledger = vec![
            row("e1", "d1", "f1", d(2023, 1, 1), CashflowType::Contribution, dec!(-100)),
            row("e2", "d2", "f1", d(2023, 2, 1), CashflowType::Contribution, dec!(-50)),
            row("e3", "d3", "f2", d(2023, 1, 1), CashflowType::Contribution, dec!(-10)),
            row("e4", "d4", "f3", d(2023, 3, 1), CashflowType::PrincipalReturn, dec!(10)),
        ];
        let mut rec = MemoryRecorder::new();
        let rows = compute_metrics(&GroupKey::fund(), &ledger, &mut rec);
        let funds: Vec<Option<&str>> = rows.iter().map(|r| r.entity()).collect();
        assert_eq!(funds, vec![Some("f1"), Some("f2"), Some("f3")]);
        assert_eq!(rows[0].paid_in, dec!(150));
    }

    #[test]
    fn test_missing_group_column_keeps_xirr() {
        // Fund-level rows only: the deal column never has a value.
        let ledger = vec![
            CashflowRecord::fund_level("f1", d(2023, 1, 1), CashflowType::Contribution, dec!(-100)),
            CashflowRecord::fund_level("f1", d(2024, 1, 1), CashflowType::PrincipalReturn, dec!(110)),
        ];
        let key = GroupKey::new(vec![GroupColumn::Deal, GroupColumn::Fund]).unwrap();
        let mut rec = MemoryRecorder::new();
        let rows = compute_metrics(&key, &ledger, &mut rec);
        assert!(rows.is_empty());
        assert_eq!(rec.counts().get(Degradation::MissingGroupColumn), 1);

        let key = GroupKey::new(vec![GroupColumn::Fund]).unwrap();
        let rows = compute_metrics(&key, &ledger, &mut rec);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_xirr_only_entity_resolves_parents() {
        // Zero-amount rows are outside both monetary partials but still
        // reach the solver.
        let ledger = vec![row(
            "e9",
            "d9",
            "f9",
            d(2023, 1, 1),
            CashflowType::Interest,
            Decimal::ZERO,
        )];
        let mut rec = MemoryRecorder::new();
        let rows = compute_metrics(&GroupKey::facility(), &ledger, &mut rec);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].key,
            vec![Some("e9".to_string()), Some("d9".to_string()), Some("f9".to_string())]
        );
        assert_eq!(rows[0].paid_in, Decimal::ZERO);
        assert_eq!(rows[0].xirr, None);
    }

    #[test]
    fn test_unsorted_history_is_sorted_before_solving() {
        let ledger = vec![
            row("e1", "d1", "f1", d(2024, 1, 1), CashflowType::ExitFee, dec!(110)),
            row("e1", "d1", "f1", d(2023, 1, 1), CashflowType::Contribution, dec!(-100)),
        ];
        let mut rec = MemoryRecorder::new();
        let out = entity_xirr(&GroupKey::facility(), &ledger, &mut rec);
        let irr = out["e1"].unwrap();
        assert!((irr - dec!(0.10)).abs() < dec!(0.0001));
    }
}
