use std::time::Instant;

use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use credit_perf_core::financing::{self, RateCurve};
use credit_perf_core::observe::{LogRecorder, Recorder};
use credit_perf_core::types::with_metadata;

use super::metrics::prepare_ledger;
use super::SourceArgs;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FinancingView {
    /// One row per fund draw: financed principal and undrawn balance
    FundInfo,
    /// Monthly accrual rows with curve and all-in rates
    FundCurve,
    /// Interest and undrawn-fee cash flows
    FeeCalc,
    /// All three tables
    All,
}

/// Arguments for the leverage financing schedule
#[derive(Args)]
pub struct FinancingArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Which table to emit
    #[arg(long, value_enum, default_value = "fee-calc")]
    pub view: FinancingView,
}

pub fn run_financing(args: FinancingArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let input = args.source.load_input()?;
    let config = args.source.load_config()?;
    let mut recorder = LogRecorder::new();

    let ledger = prepare_ledger(&input.ledger, &config, &mut recorder);
    let draws = financing::fund_draws(&ledger, &mut recorder);
    let positions = financing::fund_positions(&draws, config.reporting_cutoff, &mut recorder);
    let curve = RateCurve::from_points(input.curve.iter().cloned()).shocked(config.rate_shock);
    let schedule = financing::build_financing_cashflows(
        &positions,
        &curve,
        config.reporting_cutoff,
        &mut recorder,
    )?;

    let result = match args.view {
        FinancingView::FundInfo => serde_json::to_value(&positions)?,
        FinancingView::FundCurve => serde_json::to_value(&schedule.fund_curve)?,
        FinancingView::FeeCalc => serde_json::to_value(&schedule.fee_calc)?,
        FinancingView::All => json!({
            "fund_info": positions,
            "fund_curve": schedule.fund_curve,
            "fee_calc": schedule.fee_calc,
        }),
    };

    let output = with_metadata(
        "Fund leverage: financed principal and undrawn capacity accrued monthly against the cost-of-funds curve",
        &config,
        recorder.counts().summary_lines(),
        start.elapsed().as_micros() as u64,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
