use std::time::Instant;

use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use credit_perf_core::time_value;
use credit_perf_core::types::{with_metadata, CashFlow, Money, Rate};

use crate::input;

/// Arguments for a standalone XIRR solve
#[derive(Args)]
pub struct XirrArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Cash flow amounts (comma-separated, e.g. "-1000,50,1100")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub amounts: Option<Vec<Decimal>>,

    /// Cash flow dates, one per amount (comma-separated YYYY-MM-DD)
    #[arg(long, value_delimiter = ',')]
    pub dates: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Deserialize)]
struct XirrInput {
    cash_flows: Vec<CashFlow>,
}

#[derive(Debug, Serialize)]
struct XirrOutput {
    xirr: Rate,
    /// NPV at the solved rate; should sit within the solver tolerance.
    npv_at_rate: Money,
    cash_flow_count: usize,
}

pub fn run_xirr(args: XirrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let (amounts, dates): (Vec<Money>, Vec<NaiveDate>) = if let Some(ref path) = args.input {
        let parsed: XirrInput = input::file::read_json(path)?;
        parsed.cash_flows.iter().map(|cf| (cf.amount, cf.date)).unzip()
    } else if let Some(data) = input::stdin::read_stdin()? {
        let parsed: XirrInput = serde_json::from_value(data)?;
        parsed.cash_flows.iter().map(|cf| (cf.amount, cf.date)).unzip()
    } else {
        let amounts = args
            .amounts
            .ok_or("--amounts is required (or provide --input)")?;
        let dates = args.dates.ok_or("--dates is required (or provide --input)")?;
        (amounts, dates)
    };

    let rate = time_value::xirr(&amounts, &dates)?;
    let npv_at_rate = time_value::xnpv(rate, &amounts, &dates)?;

    let output = with_metadata(
        "XIRR: Newton-Raphson on ACT/365 year fractions from the first date",
        &serde_json::json!({ "day_count": "ACT/365", "tolerance": "1e-6" }),
        Vec::new(),
        start.elapsed().as_micros() as u64,
        XirrOutput {
            xirr: rate,
            npv_at_rate,
            cash_flow_count: amounts.len(),
        },
    );
    Ok(serde_json::to_value(output)?)
}
