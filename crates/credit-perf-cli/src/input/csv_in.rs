//! Flat CSV exports of the ledger and the rate curve.
//!
//! Numeric columns are read as text so a malformed cell reports its row
//! and column instead of a bare serde error.

use std::io::Read;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use credit_perf_core::financing::CurvePoint;
use credit_perf_core::ledger::{CashflowRecord, CashflowType, LeverageTerms, UpfrontFees};
use credit_perf_core::Currency;

use super::file::resolve_path;

/// One ledger row as exported: leverage and upfront terms are flattened
/// onto the row.
#[derive(Debug, Deserialize)]
struct LedgerCsvRow {
    entity_id: Option<String>,
    entity_type: Option<String>,
    deal_id: Option<String>,
    fund: String,
    asof: NaiveDate,
    cashflow_type: CashflowType,
    amount: String,
    currency: Option<String>,
    facility_name: Option<String>,
    deal_name: Option<String>,
    advance_rate: Option<String>,
    commitment: Option<String>,
    cost_of_funds_curve: Option<String>,
    spread_bps: Option<String>,
    undrawn_fee_bps: Option<String>,
    oid_bps: Option<String>,
    origination_fee_bps: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurveCsvRow {
    curve: String,
    asof: NaiveDate,
    rate: String,
}

pub fn read_ledger_csv(path: &str) -> Result<Vec<CashflowRecord>, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_ledger(file)
}

pub fn read_curve_csv(path: &str) -> Result<Vec<CurvePoint>, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = std::fs::File::open(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_curve(file)
}

pub fn parse_ledger<R: Read>(reader: R) -> Result<Vec<CashflowRecord>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (idx, row) in rdr.deserialize::<LedgerCsvRow>().enumerate() {
        let line = idx + 2;
        let row = row.map_err(|e| format!("ledger line {}: {}", line, e))?;
        records.push(ledger_record(row, line)?);
    }
    Ok(records)
}

pub fn parse_curve<R: Read>(reader: R) -> Result<Vec<CurvePoint>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();

    for (idx, row) in rdr.deserialize::<CurveCsvRow>().enumerate() {
        let line = idx + 2;
        let row = row.map_err(|e| format!("curve line {}: {}", line, e))?;
        points.push(CurvePoint {
            curve: row.curve,
            asof: row.asof,
            rate: decimal(&row.rate, "rate", line)?,
        });
    }
    Ok(points)
}

fn ledger_record(row: LedgerCsvRow, line: usize) -> Result<CashflowRecord, Box<dyn std::error::Error>> {
    let terms = match (&row.advance_rate, &row.commitment, &row.cost_of_funds_curve) {
        (Some(advance), Some(commitment), Some(curve)) => Some(LeverageTerms {
            advance_rate: decimal(advance, "advance_rate", line)?,
            commitment: decimal(commitment, "commitment", line)?,
            cost_of_funds_curve: curve.clone(),
            spread_bps: optional_decimal(&row.spread_bps, "spread_bps", line)?.unwrap_or_default(),
            undrawn_fee_bps: optional_decimal(&row.undrawn_fee_bps, "undrawn_fee_bps", line)?
                .unwrap_or_default(),
        }),
        _ => None,
    };

    let oid = optional_decimal(&row.oid_bps, "oid_bps", line)?;
    let origination = optional_decimal(&row.origination_fee_bps, "origination_fee_bps", line)?;
    let upfront = if oid.is_some() || origination.is_some() {
        Some(UpfrontFees {
            oid_bps: oid.unwrap_or_default(),
            origination_fee_bps: origination.unwrap_or_default(),
        })
    } else {
        None
    };

    Ok(CashflowRecord {
        entity_id: row.entity_id,
        entity_type: row.entity_type,
        deal_id: row.deal_id,
        fund: row.fund,
        asof: row.asof,
        cashflow_type: row.cashflow_type,
        amount: decimal(&row.amount, "amount", line)?,
        currency: row.currency.as_deref().map(Currency::from_code).unwrap_or_default(),
        facility_name: row.facility_name,
        deal_name: row.deal_name,
        terms,
        upfront,
    })
}

fn decimal(raw: &str, column: &str, line: usize) -> Result<Decimal, Box<dyn std::error::Error>> {
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|_| format!("line {}: '{}' is not a number in column {}", line, raw, column).into())
}

fn optional_decimal(
    raw: &Option<String>,
    column: &str,
    line: usize,
) -> Result<Option<Decimal>, Box<dyn std::error::Error>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => decimal(value, column, line).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const LEDGER: &str = "\
entity_id,entity_type,deal_id,fund,asof,cashflow_type,amount,currency,facility_name,deal_name,advance_rate,commitment,cost_of_funds_curve,spread_bps,undrawn_fee_bps,oid_bps,origination_fee_bps
f001,facility,d01,fund_a,2020-01-15,contribution,-1000,USD,Alpha TL,Alpha,0.6,5000,sofr,250,50,,
f001,facility,d01,fund_a,2021-01-15,principal_return,1100,,Alpha TL,Alpha,,,,,,100,
";

    #[test]
    fn test_ledger_rows_with_flattened_terms() {
        let rows = parse_ledger(LEDGER.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.entity_id.as_deref(), Some("f001"));
        assert_eq!(first.cashflow_type, CashflowType::Contribution);
        assert_eq!(first.amount, dec!(-1000));
        let terms = first.terms.as_ref().unwrap();
        assert_eq!(terms.advance_rate, dec!(0.6));
        assert_eq!(terms.spread_bps, dec!(250));
        assert!(first.upfront.is_none());

        let second = &rows[1];
        assert!(second.terms.is_none());
        assert_eq!(second.currency, Currency::USD);
        assert_eq!(second.upfront.as_ref().unwrap().oid_bps, dec!(100));
    }

    #[test]
    fn test_bad_amount_names_line_and_column() {
        let bad = "\
entity_id,entity_type,deal_id,fund,asof,cashflow_type,amount,currency,facility_name,deal_name,advance_rate,commitment,cost_of_funds_curve,spread_bps,undrawn_fee_bps,oid_bps,origination_fee_bps
f001,facility,d01,fund_a,2020-01-15,contribution,abc,,,,,,,,,,
";
        let err = parse_ledger(bad.as_bytes()).unwrap_err().to_string();
        assert!(err.contains("line 2"));
        assert!(err.contains("amount"));
    }

    #[test]
    fn test_curve_rows() {
        let csv = "curve,asof,rate\nsofr,2020-01-31,0.0155\nsofr,2020-02-29,1.5e-2\n";
        let points = parse_curve(csv.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].rate, dec!(0.0155));
        assert_eq!(points[1].rate, dec!(0.015));
        assert_eq!(points[1].asof, NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
    }
}
