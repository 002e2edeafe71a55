use clap::{Args, ValueEnum};
use serde_json::{json, Value};

use credit_perf_core::metrics::GroupKey;
use credit_perf_core::observe::LogRecorder;
use credit_perf_core::pipeline;

use super::metrics::rows_to_value;
use super::SourceArgs;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RunView {
    /// Facility, deal and fund rows with gross and net metrics
    Hierarchy,
    /// Gross metrics per facility
    Facility,
    /// Gross metrics per deal
    Deal,
    /// Gross and net metrics per fund
    Fund,
    /// Financing positions per fund draw
    FundInfo,
    /// Monthly accrual rows
    FundCurve,
    /// Financing cash flows
    FeeCalc,
    /// Degraded row counts by kind
    Degradations,
    /// Every table
    All,
}

/// Arguments for a full performance run
#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Which table to emit
    #[arg(long, value_enum, default_value = "hierarchy")]
    pub view: RunView,
}

pub fn run_pipeline(args: RunArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let input = args.source.load_input()?;
    let config = args.source.load_config()?;
    let mut recorder = LogRecorder::new();

    let output = pipeline::run_pipeline(&input, &config, &mut recorder)?;
    let tables = &output.result;

    let result = match args.view {
        RunView::Hierarchy => serde_json::to_value(&tables.hierarchy)?,
        RunView::Facility => rows_to_value(&GroupKey::facility(), &tables.facility_metrics),
        RunView::Deal => rows_to_value(&GroupKey::deal(), &tables.deal_metrics),
        RunView::Fund => json!({
            "gross": rows_to_value(&GroupKey::fund(), &tables.fund_metrics),
            "net": rows_to_value(&GroupKey::fund(), &tables.fund_net_metrics),
        }),
        RunView::FundInfo => serde_json::to_value(&tables.fund_info)?,
        RunView::FundCurve => serde_json::to_value(&tables.fund_curve)?,
        RunView::FeeCalc => serde_json::to_value(&tables.fee_calc)?,
        RunView::Degradations => serde_json::to_value(&tables.degradations)?,
        RunView::All => return Ok(serde_json::to_value(&output)?),
    };

    Ok(json!({
        "result": result,
        "methodology": output.methodology,
        "assumptions": output.assumptions,
        "warnings": output.warnings,
        "metadata": output.metadata,
    }))
}
