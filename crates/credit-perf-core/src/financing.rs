//! Fund-level leverage financing.
//!
//! Each fund finances a share of every contribution through a credit
//! facility. The facility charges interest (curve + spread) on the financed
//! principal and an undrawn fee on unused capacity. Draws are expanded into a
//! month-end accrual schedule, priced against a rate curve, and turned into
//! interest / undrawn-fee cash flows paid on the 15th of the following month.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::error::CreditPerfError;
use crate::ledger::{CashflowRecord, CashflowType, LeverageTerms};
use crate::observe::{Degradation, Recorder};
use crate::types::{Bps, Money, Rate};
use crate::CreditPerfResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Credit line size as a share of fund commitment.
pub const CREDIT_LINE_UTILIZATION: Decimal = dec!(0.2);
/// Day of the month on which monthly financing charges are paid.
pub const PAYMENT_DAY: u32 = 15;
/// Basis points divisor
const BPS_DIVISOR: Decimal = dec!(10000);
const MONTHS_PER_YEAR: Decimal = dec!(12);

// ---------------------------------------------------------------------------
// Rate curve
// ---------------------------------------------------------------------------

/// One month-end curve observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub curve: String,
    pub asof: NaiveDate,
    pub rate: Rate,
}

/// Month-end rates keyed by (curve name, as-of date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateCurve {
    points: BTreeMap<(String, NaiveDate), Rate>,
}

impl RateCurve {
    /// Later duplicates of a (curve, date) pair replace earlier ones.
    pub fn from_points<I: IntoIterator<Item = CurvePoint>>(points: I) -> Self {
        Self {
            points: points
                .into_iter()
                .map(|p| ((p.curve, p.asof), p.rate))
                .collect(),
        }
    }

    pub fn rate(&self, curve: &str, month_end: NaiveDate) -> Option<Rate> {
        self.points.get(&(curve.to_string(), month_end)).copied()
    }

    /// Parallel shift of every point. Applied once to the whole table so
    /// shocked and unshocked schedules differ by exactly `shock` per row.
    pub fn shocked(&self, shock: Rate) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|(k, r)| (k.clone(), *r + shock))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Draws and positions
// ---------------------------------------------------------------------------

/// One financed contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundDraw {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub fund: String,
    pub draw_date: NaiveDate,
    /// Signed contribution amount as stored in the ledger.
    pub contribution: Money,
    /// `contribution × advance_rate`; carries the contribution's sign.
    pub financed_principal: Money,
    /// `commitment × CREDIT_LINE_UTILIZATION`
    pub credit_line: Money,
    pub exit_date: Option<NaiveDate>,
    pub terms: LeverageTerms,
}

/// One fund's draw-to-exit financing window (the `fund_info` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundFinancingPosition {
    pub fund: String,
    pub draw_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    pub financed_principal: Money,
    pub undrawn_balance: Money,
    pub credit_line: Money,
    pub cost_of_funds_curve: String,
    pub spread_bps: Bps,
    pub undrawn_fee_bps: Bps,
    pub advance_rate: Rate,
}

/// Collect one draw per contribution carrying leverage terms. The exit date
/// is the facility's latest `exit_fee` date.
pub fn fund_draws(ledger: &[CashflowRecord], recorder: &mut dyn Recorder) -> Vec<FundDraw> {
    let mut exits: BTreeMap<&str, NaiveDate> = BTreeMap::new();
    for row in ledger
        .iter()
        .filter(|r| r.cashflow_type == CashflowType::ExitFee)
    {
        if let Some(entity) = row.entity_id.as_deref() {
            let slot = exits.entry(entity).or_insert(row.asof);
            if row.asof > *slot {
                *slot = row.asof;
            }
        }
    }

    let mut missing_terms = 0usize;
    let draws: Vec<FundDraw> = ledger
        .iter()
        .filter(|r| r.cashflow_type == CashflowType::Contribution)
        .filter_map(|row| {
            let Some(terms) = row.terms.clone() else {
                missing_terms += 1;
                return None;
            };
            Some(FundDraw {
                entity_id: row.entity_id.clone(),
                fund: row.fund.clone(),
                draw_date: row.asof,
                contribution: row.amount,
                financed_principal: row.amount * terms.advance_rate,
                credit_line: terms.commitment * CREDIT_LINE_UTILIZATION,
                exit_date: row
                    .entity_id
                    .as_deref()
                    .and_then(|e| exits.get(e).copied()),
                terms,
            })
        })
        .collect();

    recorder.degraded(Degradation::MissingLeverageTerms, missing_terms, "fund_draws");
    recorder.info(&format!("fund_draws: processed {} contributions", draws.len()));
    draws
}

/// Aggregate draws per (fund, draw date, exit date). The earliest position
/// of each fund that will be scheduled carries the whole credit line in its
/// undrawn balance; every other position carries only its own financed
/// principal. A position is scheduled when its exit is known or a
/// `reporting_cutoff` closes it.
pub fn fund_positions(
    draws: &[FundDraw],
    reporting_cutoff: Option<NaiveDate>,
    recorder: &mut dyn Recorder,
) -> Vec<FundFinancingPosition> {
    let mut grouped: BTreeMap<(&str, NaiveDate, Option<NaiveDate>), (Money, &FundDraw)> =
        BTreeMap::new();
    for draw in draws {
        grouped
            .entry((draw.fund.as_str(), draw.draw_date, draw.exit_date))
            .and_modify(|(sum, _)| *sum += draw.financed_principal)
            .or_insert((draw.financed_principal, draw));
    }

    let mut line_assigned: BTreeSet<&str> = BTreeSet::new();
    let positions: Vec<FundFinancingPosition> = grouped
        .into_iter()
        .map(|((fund, draw_date, exit_date), (financed, first))| {
            let scheduled = exit_date.is_some() || reporting_cutoff.is_some();
            let carries_line = scheduled && line_assigned.insert(fund);
            let undrawn_balance = if carries_line {
                first.credit_line + financed
            } else {
                financed
            };
            FundFinancingPosition {
                fund: fund.to_string(),
                draw_date,
                exit_date,
                financed_principal: financed,
                undrawn_balance,
                credit_line: first.credit_line,
                cost_of_funds_curve: first.terms.cost_of_funds_curve.clone(),
                spread_bps: first.terms.spread_bps,
                undrawn_fee_bps: first.terms.undrawn_fee_bps,
                advance_rate: first.terms.advance_rate,
            }
        })
        .collect();

    let funds = positions
        .iter()
        .map(|p| p.fund.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    recorder.info(&format!(
        "fund_positions: aggregated {} rows for {funds} funds",
        positions.len()
    ));
    let without_line = funds - line_assigned.len();
    if without_line > 0 {
        recorder.warn(&format!(
            "fund_positions: {without_line} fund(s) have no scheduled draw to carry the credit line"
        ));
    }
    positions
}

// ---------------------------------------------------------------------------
// Monthly schedule
// ---------------------------------------------------------------------------

/// One fund × month-end financing snapshot (the `fund_curve` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAccrualRow {
    pub fund: String,
    pub draw_date: NaiveDate,
    pub exit_date: Option<NaiveDate>,
    pub month_end: NaiveDate,
    pub payment_date: NaiveDate,
    pub cost_of_funds_curve: String,
    /// Curve rate at the month-end; `None` when the curve has no point.
    pub rate: Option<Rate>,
    pub all_in_rate: Option<Rate>,
    pub spread_bps: Bps,
    pub undrawn_fee_bps: Bps,
    pub undrawn_fee_rate: Rate,
    pub financed_principal: Money,
    pub undrawn_balance: Money,
}

/// Expand every position over its month-ends and join the curve.
///
/// Scaffolding runs from the month-end before the draw to the month-end of
/// the exit month; only month-ends inside `[draw, exit]` survive. Positions
/// without an exit run to `reporting_cutoff`, or are skipped when none is
/// given.
pub fn expand_monthly(
    positions: &[FundFinancingPosition],
    curve: &RateCurve,
    reporting_cutoff: Option<NaiveDate>,
    recorder: &mut dyn Recorder,
) -> CreditPerfResult<Vec<MonthlyAccrualRow>> {
    let mut out = Vec::new();
    let mut open = 0usize;
    let mut unmatched = 0usize;

    for pos in positions {
        let Some(end) = pos.exit_date.or(reporting_cutoff) else {
            open += 1;
            continue;
        };
        let undrawn_fee_rate = pos.undrawn_fee_bps / BPS_DIVISOR;
        let spread = pos.spread_bps / BPS_DIVISOR;

        let scaffold = calendar::month_ends(
            calendar::previous_month_end(pos.draw_date),
            calendar::month_end(end),
        );
        for month_end in scaffold {
            if month_end < pos.draw_date || month_end > end {
                continue;
            }
            let payment_date = calendar::day_of_next_month(month_end, PAYMENT_DAY)
                .ok_or_else(|| {
                    CreditPerfError::DateError(format!("no payment date after {month_end}"))
                })?;
            let rate = curve.rate(&pos.cost_of_funds_curve, month_end);
            if rate.is_none() {
                unmatched += 1;
            }
            out.push(MonthlyAccrualRow {
                fund: pos.fund.clone(),
                draw_date: pos.draw_date,
                exit_date: pos.exit_date,
                month_end,
                payment_date,
                cost_of_funds_curve: pos.cost_of_funds_curve.clone(),
                rate,
                all_in_rate: rate.map(|r| r + spread),
                spread_bps: pos.spread_bps,
                undrawn_fee_bps: pos.undrawn_fee_bps,
                undrawn_fee_rate,
                financed_principal: pos.financed_principal,
                undrawn_balance: pos.undrawn_balance,
            });
        }
    }

    recorder.degraded(Degradation::OpenPosition, open, "expand_monthly");
    recorder.degraded(Degradation::UnmatchedCurveRate, unmatched, "expand_monthly");
    recorder.info(&format!(
        "expand_monthly: produced {} fund×month rows",
        out.len()
    ));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Fee cash flows
// ---------------------------------------------------------------------------

/// One financing cash flow (the `fee_calc` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingCashflowRow {
    pub payment_date: NaiveDate,
    pub cashflow_type: CashflowType,
    pub fund: String,
    /// `None` when the month had no curve rate.
    pub amount: Option<Money>,
}

/// Two cash flows per accrual row: `interest = financed × all_in / 12` and
/// `undrawn_fee = −(undrawn × fee_rate / 12)`.
///
/// The undrawn fee is booked negative on purpose: a later draw's negative
/// undrawn balance then shows up as a positive paydown of the fee.
pub fn monthly_fees(accruals: &[MonthlyAccrualRow], recorder: &mut dyn Recorder) -> Vec<FinancingCashflowRow> {
    let mut out = Vec::with_capacity(accruals.len() * 2);
    for row in accruals {
        out.push(FinancingCashflowRow {
            payment_date: row.payment_date,
            cashflow_type: CashflowType::Interest,
            fund: row.fund.clone(),
            amount: row
                .all_in_rate
                .map(|r| row.financed_principal * r / MONTHS_PER_YEAR),
        });
        out.push(FinancingCashflowRow {
            payment_date: row.payment_date,
            cashflow_type: CashflowType::UndrawnFee,
            fund: row.fund.clone(),
            amount: Some(-(row.undrawn_balance * row.undrawn_fee_rate / MONTHS_PER_YEAR)),
        });
    }
    recorder.info(&format!(
        "monthly_fees: generated {} fee rows ({} interest, {} undrawn_fee)",
        out.len(),
        accruals.len(),
        accruals.len()
    ));
    out
}

/// Accrual schedule plus the fee cash flows derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingSchedule {
    pub fund_curve: Vec<MonthlyAccrualRow>,
    pub fee_calc: Vec<FinancingCashflowRow>,
}

/// Expand positions against the curve and emit the fee cash flows.
pub fn build_financing_cashflows(
    positions: &[FundFinancingPosition],
    curve: &RateCurve,
    reporting_cutoff: Option<NaiveDate>,
    recorder: &mut dyn Recorder,
) -> CreditPerfResult<FinancingSchedule> {
    let fund_curve = expand_monthly(positions, curve, reporting_cutoff, recorder)?;
    let fee_calc = monthly_fees(&fund_curve, recorder);
    Ok(FinancingSchedule {
        fund_curve,
        fee_calc,
    })
}

/// Append priced financing cash flows to the ledger as fund-level rows.
/// Existing rows are untouched; unpriced fees stay out of the ledger.
pub fn inject_financing(
    ledger: &[CashflowRecord],
    fees: &[FinancingCashflowRow],
    recorder: &mut dyn Recorder,
) -> Vec<CashflowRecord> {
    let mut out = ledger.to_vec();
    let mut unpriced = 0usize;
    for fee in fees {
        match fee.amount {
            Some(amount) => out.push(CashflowRecord::fund_level(
                fee.fund.clone(),
                fee.payment_date,
                fee.cashflow_type,
                amount,
            )),
            None => unpriced += 1,
        }
    }
    recorder.degraded(Degradation::UnpricedFee, unpriced, "inject_financing");
    recorder.info(&format!(
        "inject_financing: ledger grew from {} to {} rows",
        ledger.len(),
        out.len()
    ));
    out
}
