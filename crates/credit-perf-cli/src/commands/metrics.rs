use std::time::Instant;

use clap::Args;
use serde_json::{Map, Value};

use credit_perf_core::adjustments;
use credit_perf_core::config::PipelineConfig;
use credit_perf_core::ledger::{self, CashflowRecord};
use credit_perf_core::metrics::{self, GroupKey, MetricsRow};
use credit_perf_core::observe::{LogRecorder, Recorder};
use credit_perf_core::types::with_metadata;

use super::SourceArgs;

/// Arguments for grouped return metrics
#[derive(Args)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Group key: facility, deal, fund, or a column list such as "deal_id,fund"
    #[arg(long, default_value = "fund")]
    pub level: GroupKey,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let input = args.source.load_input()?;
    let config = args.source.load_config()?;
    let mut recorder = LogRecorder::new();

    let ledger = prepare_ledger(&input.ledger, &config, &mut recorder);
    let rows = metrics::compute_metrics(&args.level, &ledger, &mut recorder);
    let warnings = recorder.counts().summary_lines();

    let output = with_metadata(
        &format!("Paid-in, distributions, MOIC and XIRR (ACT/365) grouped by {}", args.level),
        &config,
        warnings,
        start.elapsed().as_micros() as u64,
        rows_to_value(&args.level, &rows),
    );
    Ok(serde_json::to_value(output)?)
}

/// Sign normalisation and the configured adjustments, in pipeline order.
pub fn prepare_ledger(
    raw: &[CashflowRecord],
    config: &PipelineConfig,
    recorder: &mut dyn Recorder,
) -> Vec<CashflowRecord> {
    let mut ledger = ledger::normalize_signs(raw);
    if config.exclude_pik {
        ledger = adjustments::exclude_pik_interest(&ledger, recorder);
    }
    if config.apply_upfront_fees {
        ledger = adjustments::apply_upfront_fees(&ledger, recorder);
    }
    ledger
}

/// One flat object per row with the key columns spelled out, so table and
/// CSV output get a column per key part.
pub fn rows_to_value(key: &GroupKey, rows: &[MetricsRow]) -> Value {
    let flat = rows
        .iter()
        .map(|row| {
            let mut obj = Map::new();
            for (column, value) in key.columns().iter().zip(row.key.iter()) {
                obj.insert(
                    column.column_name().to_string(),
                    value.clone().map(Value::String).unwrap_or(Value::Null),
                );
            }
            obj.insert("paid_in".into(), decimal_value(Some(&row.paid_in)));
            obj.insert("distributed".into(), decimal_value(Some(&row.distributed)));
            obj.insert("moic".into(), decimal_value(row.moic.as_ref()));
            obj.insert("xirr".into(), decimal_value(row.xirr.as_ref()));
            Value::Object(obj)
        })
        .collect();
    Value::Array(flat)
}

fn decimal_value<T: serde::Serialize>(value: Option<&T>) -> Value {
    value
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use credit_perf_core::ledger::CashflowType;
    use credit_perf_core::observe::MemoryRecorder;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rows_flatten_key_columns() {
        let ledger = vec![
            CashflowRecord::facility("f001", "d01", "fund_a", d(2020, 1, 1), CashflowType::Contribution, dec!(-1000)),
            CashflowRecord::facility("f001", "d01", "fund_a", d(2021, 1, 1), CashflowType::PrincipalReturn, dec!(1100)),
        ];
        let mut recorder = MemoryRecorder::new();
        let key = GroupKey::deal();
        let rows = metrics::compute_metrics(&key, &ledger, &mut recorder);
        let value = rows_to_value(&key, &rows);

        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["deal_id"], Value::String("d01".into()));
        assert_eq!(first["fund"], Value::String("fund_a".into()));
        assert!(first.get("entity_id").is_none());
        assert!(!first["moic"].is_null());
    }
}
