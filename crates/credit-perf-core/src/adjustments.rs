//! Deal-level ledger adjustments applied before performance is measured.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::ledger::{CashflowRecord, CashflowType};
use crate::observe::Recorder;
use crate::types::Money;

/// One basis point as a decimal fraction.
const BPS_FACTOR: Decimal = dec!(0.0001);

/// Drop accrued PIK interest. PIK is capitalised into principal rather than
/// paid in cash, so it never reaches the investor as a distribution.
pub fn exclude_pik_interest(
    ledger: &[CashflowRecord],
    recorder: &mut dyn Recorder,
) -> Vec<CashflowRecord> {
    let out: Vec<CashflowRecord> = ledger
        .iter()
        .filter(|row| row.cashflow_type != CashflowType::PikInterest)
        .cloned()
        .collect();
    recorder.info(&format!(
        "exclude_pik_interest: removed {} accrued PIK rows",
        ledger.len() - out.len()
    ));
    out
}

/// Scale every outflow by `1 - (OID + origination fee)` so day-one discounts
/// show up as a smaller investment. Rows without upfront terms are unchanged.
pub fn apply_upfront_fees(
    ledger: &[CashflowRecord],
    recorder: &mut dyn Recorder,
) -> Vec<CashflowRecord> {
    let before: Money = total_outflow(ledger);
    let mut adjusted = 0usize;

    let out: Vec<CashflowRecord> = ledger
        .iter()
        .map(|row| match &row.upfront {
            Some(fees) if row.amount < Decimal::ZERO => {
                adjusted += 1;
                let factor =
                    Decimal::ONE - (fees.oid_bps + fees.origination_fee_bps) * BPS_FACTOR;
                CashflowRecord {
                    amount: row.amount * factor,
                    ..row.clone()
                }
            }
            _ => row.clone(),
        })
        .collect();

    recorder.info(&format!(
        "apply_upfront_fees: adjusted {adjusted} outflows, invested {before} -> {}",
        total_outflow(&out)
    ));
    out
}

fn total_outflow(ledger: &[CashflowRecord]) -> Money {
    ledger
        .iter()
        .filter(|r| r.amount < Decimal::ZERO)
        .map(|r| r.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UpfrontFees;
    use crate::observe::MemoryRecorder;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_pik_rows_removed() {
        let ledger = vec![
            CashflowRecord::facility("f1", "d1", "fa", d(2023, 1, 1), CashflowType::Contribution, dec!(-100)),
            CashflowRecord::facility("f1", "d1", "fa", d(2023, 6, 30), CashflowType::PikInterest, dec!(4)),
            CashflowRecord::facility("f1", "d1", "fa", d(2023, 6, 30), CashflowType::Interest, dec!(3)),
        ];
        let mut rec = MemoryRecorder::new();
        let out = exclude_pik_interest(&ledger, &mut rec);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.cashflow_type != CashflowType::PikInterest));
        assert!(rec.contains("removed 1"));
    }

    #[test]
    fn test_upfront_fees_shrink_outflows_only() {
        let fees = UpfrontFees {
            oid_bps: dec!(100),
            origination_fee_bps: dec!(50),
        };
        let ledger = vec![
            CashflowRecord::facility("f1", "d1", "fa", d(2023, 1, 1), CashflowType::Contribution, dec!(-1000))
                .with_upfront(fees.clone()),
            CashflowRecord::facility("f1", "d1", "fa", d(2024, 1, 1), CashflowType::ExitFee, dec!(1200))
                .with_upfront(fees),
            CashflowRecord::facility("f2", "d2", "fa", d(2023, 1, 1), CashflowType::Contribution, dec!(-500)),
        ];
        let mut rec = MemoryRecorder::new();
        let out = apply_upfront_fees(&ledger, &mut rec);
        assert_eq!(out[0].amount, dec!(-985));
        assert_eq!(out[1].amount, dec!(1200));
        assert_eq!(out[2].amount, dec!(-500));
    }
}
