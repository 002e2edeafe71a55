use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CreditPerfError;
use crate::types::Rate;
use crate::CreditPerfResult;

/// Tunables for a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Absolute parallel shift added to every curve rate (0.01 = +100 bps).
    pub rate_shock: Rate,
    /// Horizon for financing positions that have not exited yet. Without one,
    /// open positions are left out of the financing schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_cutoff: Option<NaiveDate>,
    /// Drop accrued PIK interest before measuring returns.
    pub exclude_pik: bool,
    /// Net OID and origination fees off each outflow.
    pub apply_upfront_fees: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rate_shock: Decimal::ZERO,
            reporting_cutoff: None,
            exclude_pik: true,
            apply_upfront_fees: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> CreditPerfResult<()> {
        if self.rate_shock.abs() >= Decimal::ONE {
            return Err(CreditPerfError::InvalidInput {
                field: "rate_shock".into(),
                reason: "Shock is an absolute decimal (0.01 = +100 bps); |shock| must be below 1"
                    .into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"rate_shock": "0.01"}"#).unwrap();
        assert_eq!(cfg.rate_shock, dec!(0.01));
        assert!(cfg.exclude_pik);
        assert!(cfg.apply_upfront_fees);
        assert_eq!(cfg.reporting_cutoff, None);
    }

    #[test]
    fn test_validate_rejects_percent_shock() {
        let cfg = PipelineConfig {
            rate_shock: dec!(100),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }
}
