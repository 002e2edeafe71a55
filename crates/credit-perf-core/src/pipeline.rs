//! End-to-end run: gross metrics, leverage financing, net fund metrics and
//! the hierarchy comparison table.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::adjustments;
use crate::config::PipelineConfig;
use crate::financing::{self, CurvePoint, FinancingCashflowRow, FundFinancingPosition, MonthlyAccrualRow, RateCurve};
use crate::hierarchy::{self, HierarchyMetricsRow, NameBook};
use crate::ledger::{self, CashflowRecord};
use crate::metrics::{self, GroupKey, MetricsRow};
use crate::observe::{DegradationCounts, Recorder};
use crate::types::{with_metadata, ComputationOutput};
use crate::CreditPerfResult;

/// Already-cleaned tables the pipeline consumes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInput {
    pub ledger: Vec<CashflowRecord>,
    #[serde(default)]
    pub curve: Vec<CurvePoint>,
}

/// Every table the run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub facility_metrics: Vec<MetricsRow>,
    pub deal_metrics: Vec<MetricsRow>,
    pub fund_metrics: Vec<MetricsRow>,
    pub fund_info: Vec<FundFinancingPosition>,
    pub fund_curve: Vec<MonthlyAccrualRow>,
    pub fee_calc: Vec<FinancingCashflowRow>,
    pub fund_net_metrics: Vec<MetricsRow>,
    pub hierarchy: Vec<HierarchyMetricsRow>,
    pub degradations: DegradationCounts,
}

/// Run the whole computation over an in-memory ledger and curve.
///
/// Stages never mutate their input: each returns a new table, so the fund
/// level can be re-aggregated after financing rows are appended.
pub fn run_pipeline(
    input: &PipelineInput,
    config: &PipelineConfig,
    recorder: &mut dyn Recorder,
) -> CreditPerfResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();
    config.validate()?;
    // Counts already on the recorder belong to earlier runs.
    let baseline = recorder.counts().clone();

    recorder.info(&format!(
        "starting pipeline: {} ledger rows, {} curve points, shock {}",
        input.ledger.len(),
        input.curve.len(),
        config.rate_shock
    ));

    let flipped = ledger::sign_violations(&input.ledger);
    if flipped > 0 {
        recorder.info(&format!("normalize_signs: corrected the sign of {flipped} rows"));
    }
    let mut ledger = ledger::normalize_signs(&input.ledger);
    if config.exclude_pik {
        ledger = adjustments::exclude_pik_interest(&ledger, recorder);
    }
    if config.apply_upfront_fees {
        ledger = adjustments::apply_upfront_fees(&ledger, recorder);
    }

    // Gross, pre-financing
    let facility_metrics = metrics::compute_metrics(&GroupKey::facility(), &ledger, recorder);
    let deal_metrics = metrics::compute_metrics(&GroupKey::deal(), &ledger, recorder);
    let fund_metrics = metrics::compute_metrics(&GroupKey::fund(), &ledger, recorder);

    // Leverage financing
    let draws = financing::fund_draws(&ledger, recorder);
    let fund_info = financing::fund_positions(&draws, config.reporting_cutoff, recorder);
    let curve = RateCurve::from_points(input.curve.iter().cloned()).shocked(config.rate_shock);
    if curve.is_empty() && !fund_info.is_empty() {
        recorder.warn("no curve points supplied: every financing month will be unpriced");
    } else {
        recorder.debug(&format!("rate curve: {} distinct points", curve.len()));
    }
    let schedule =
        financing::build_financing_cashflows(&fund_info, &curve, config.reporting_cutoff, recorder)?;

    // Net, post-financing
    let net_ledger = financing::inject_financing(&ledger, &schedule.fee_calc, recorder);
    let fund_net_metrics = metrics::compute_metrics(&GroupKey::fund(), &net_ledger, recorder);

    let names = NameBook::from_ledger(&ledger);
    let stacked = hierarchy::rollup(&facility_metrics, &deal_metrics, &fund_metrics, &names);
    let hierarchy = hierarchy::assign_net_metrics(stacked, &fund_net_metrics);

    let degradations = recorder.counts().since(&baseline);
    let warnings = degradations.summary_lines();
    recorder.info(&format!(
        "pipeline finished: {} hierarchy rows, {} degraded rows",
        hierarchy.len(),
        degradations.total()
    ));

    let output = PipelineOutput {
        facility_metrics,
        deal_metrics,
        fund_metrics,
        fund_info,
        fund_curve: schedule.fund_curve,
        fee_calc: schedule.fee_calc,
        fund_net_metrics,
        hierarchy,
        degradations,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Private credit performance: paid-in, distributions, MOIC, XIRR (ACT/365), gross and net of fund leverage",
        config,
        warnings,
        elapsed,
        output,
    ))
}
