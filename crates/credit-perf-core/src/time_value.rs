use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::CreditPerfError;
use crate::types::{Money, Rate};
use crate::CreditPerfResult;

/// Step size below which the Newton iteration is considered converged.
const XIRR_TOLERANCE: Decimal = dec!(0.000001);
/// NPV magnitude treated as an exact root.
const NPV_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_XIRR_ITERATIONS: u32 = 10_000;
/// Rates at or below -100% make the growth factor non-positive.
const MIN_RATE: Rate = dec!(-1);
const MAX_RATE: Rate = dec!(100);
/// ACT/365 day count.
const DAYS_PER_YEAR: Decimal = dec!(365);

/// Year fractions (ACT/365) measured from the earliest date in the set.
fn year_fractions(dates: &[NaiveDate]) -> Vec<Decimal> {
    let Some(t0) = dates.iter().min().copied() else {
        return Vec::new();
    };
    dates
        .iter()
        .map(|d| Decimal::from((*d - t0).num_days()) / DAYS_PER_YEAR)
        .collect()
}

/// NPV and its derivative with respect to the rate. `None` on overflow or a
/// non-positive growth factor.
fn npv_and_slope(rate: Rate, cashflows: &[Money], years: &[Decimal]) -> Option<(Money, Money)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut npv = Decimal::ZERO;
    let mut slope = Decimal::ZERO;
    for (cf, t) in cashflows.iter().zip(years) {
        let discount = one_plus_r.checked_powd(*t)?;
        if discount.is_zero() {
            return None;
        }
        npv = npv.checked_add(cf.checked_div(discount)?)?;
        let d = t
            .checked_mul(*cf)?
            .checked_div(discount.checked_mul(one_plus_r)?)?;
        slope = slope.checked_sub(d)?;
    }
    Some((npv, slope))
}

/// Net present value of irregularly dated cash flows (ACT/365).
pub fn xnpv(rate: Rate, cashflows: &[Money], dates: &[NaiveDate]) -> CreditPerfResult<Money> {
    if cashflows.len() != dates.len() {
        return Err(CreditPerfError::DimensionMismatch {
            left: cashflows.len(),
            right: dates.len(),
        });
    }
    if rate <= MIN_RATE {
        return Err(CreditPerfError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let years = year_fractions(dates);
    npv_and_slope(rate, cashflows, &years)
        .map(|(npv, _)| npv)
        .ok_or_else(|| CreditPerfError::InvalidInput {
            field: "rate".into(),
            reason: "Discounting overflowed the decimal range".into(),
        })
}

/// Extended IRR for irregular cash flow dates using Newton-Raphson.
///
/// Contributions are negative, distributions positive. The seed is -10% when
/// the flows net to a loss and +10% otherwise.
pub fn xirr(cashflows: &[Money], dates: &[NaiveDate]) -> CreditPerfResult<Rate> {
    if cashflows.len() != dates.len() {
        return Err(CreditPerfError::DimensionMismatch {
            left: cashflows.len(),
            right: dates.len(),
        });
    }
    if cashflows.len() < 2 {
        return Err(CreditPerfError::InsufficientData(
            "XIRR requires at least two dated cash flows".into(),
        ));
    }

    let has_inflow = cashflows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_outflow = cashflows.iter().any(|cf| *cf < Decimal::ZERO);
    if !(has_inflow && has_outflow) {
        return Err(CreditPerfError::InvalidCashflowSet(
            "XIRR requires at least one positive and one negative cash flow".into(),
        ));
    }

    let years = year_fractions(dates);
    let total: Money = cashflows.iter().sum();
    let mut rate = if total < Decimal::ZERO {
        dec!(-0.1)
    } else {
        dec!(0.1)
    };
    let mut last_delta = Decimal::ZERO;

    for i in 0..MAX_XIRR_ITERATIONS {
        let Some((npv_val, dnpv)) = npv_and_slope(rate, cashflows, &years) else {
            return Err(CreditPerfError::ConvergenceFailure {
                function: "XIRR".into(),
                iterations: i,
                last_delta,
            });
        };
        last_delta = npv_val;

        if npv_val.abs() < NPV_THRESHOLD {
            return Ok(rate);
        }

        let step = match npv_val.checked_div(dnpv) {
            Some(s) if !dnpv.is_zero() => s,
            _ => {
                return Err(CreditPerfError::ConvergenceFailure {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: npv_val,
                })
            }
        };

        let prev = rate;
        rate -= step;

        // Outside the domain: halve the distance to -100% instead of
        // clamping, so deep-loss roots stay reachable.
        if rate <= MIN_RATE {
            rate = (prev + MIN_RATE) / dec!(2);
        } else if rate > MAX_RATE {
            rate = MAX_RATE;
        }

        if (rate - prev).abs() < XIRR_TOLERANCE {
            return Ok(rate);
        }
    }

    Err(CreditPerfError::ConvergenceFailure {
        function: "XIRR".into(),
        iterations: MAX_XIRR_ITERATIONS,
        last_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_xirr_one_year_ten_percent() {
        let r = xirr(&[dec!(-100), dec!(110)], &[d(2023, 1, 1), d(2024, 1, 1)]).unwrap();
        assert!((r - dec!(0.10)).abs() < dec!(0.0001), "got {r}");
    }

    #[test]
    fn test_xirr_twenty_percent() {
        let r = xirr(&[dec!(-1000), dec!(1200)], &[d(2023, 1, 1), d(2024, 1, 1)]).unwrap();
        assert!((r - dec!(0.20)).abs() < dec!(0.0001), "got {r}");
    }

    #[test]
    fn test_xirr_loss_uses_negative_seed() {
        let r = xirr(&[dec!(-1000), dec!(800)], &[d(2023, 1, 1), d(2024, 1, 1)]).unwrap();
        assert!((r - dec!(-0.20)).abs() < dec!(0.0001), "got {r}");
    }

    #[test]
    fn test_xirr_near_total_loss() {
        let flows = [dec!(-1000), dec!(1)];
        let dates = [d(2023, 1, 1), d(2024, 1, 1)];
        let r = xirr(&flows, &dates).unwrap();
        assert!((r - dec!(-0.999)).abs() < dec!(0.00001), "got {r}");
        assert!(r > dec!(-1));
        assert!(xnpv(r, &flows, &dates).unwrap().abs() < dec!(0.01));
    }

    #[test]
    fn test_xirr_single_flow_is_insufficient() {
        let err = xirr(&[dec!(-100)], &[d(2023, 1, 1)]).unwrap_err();
        assert!(matches!(err, CreditPerfError::InsufficientData(_)));
    }

    #[test]
    fn test_xirr_all_same_sign_rejected() {
        let err = xirr(&[dec!(100), dec!(110)], &[d(2023, 1, 1), d(2024, 1, 1)]).unwrap_err();
        assert!(matches!(err, CreditPerfError::InvalidCashflowSet(_)));
        let err = xirr(&[dec!(-100), dec!(-110)], &[d(2023, 1, 1), d(2024, 1, 1)]).unwrap_err();
        assert!(matches!(err, CreditPerfError::InvalidCashflowSet(_)));
    }

    #[test]
    fn test_xirr_dimension_mismatch() {
        let err = xirr(&[dec!(-100), dec!(110)], &[d(2023, 1, 1)]).unwrap_err();
        assert!(matches!(
            err,
            CreditPerfError::DimensionMismatch { left: 2, right: 1 }
        ));
    }

    #[test]
    fn test_xnpv_earliest_date_undiscounted() {
        // Dates out of order: the earliest is the base regardless of position.
        let v = xnpv(dec!(0.10), &[dec!(110), dec!(-100)], &[d(2024, 1, 1), d(2023, 1, 1)]).unwrap();
        assert!(v.abs() < dec!(0.0000001), "got {v}");
    }

    #[test]
    fn test_xnpv_rejects_rate_below_minus_one() {
        assert!(xnpv(dec!(-1), &[dec!(-1)], &[d(2023, 1, 1)]).is_err());
    }
}
