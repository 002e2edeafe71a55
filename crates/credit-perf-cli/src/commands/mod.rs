pub mod financing;
pub mod metrics;
pub mod run;
pub mod xirr;

use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use credit_perf_core::config::PipelineConfig;
use credit_perf_core::pipeline::PipelineInput;

use crate::input;

/// Where the ledger and curve come from, plus run-level overrides.
/// Shared by every command that reads the ledger.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Path to a JSON file holding `{"ledger": [...], "curve": [...]}`
    #[arg(long)]
    pub input: Option<String>,

    /// Path to a flat ledger CSV (used instead of --input)
    #[arg(long)]
    pub ledger: Option<String>,

    /// Path to a month-end rate curve CSV (curve,asof,rate)
    #[arg(long)]
    pub curve: Option<String>,

    /// Pipeline configuration file (.yaml, .yml or .json)
    #[arg(long)]
    pub config: Option<String>,

    /// Parallel shift added to every curve rate (0.01 = +100 bps)
    #[arg(long, allow_hyphen_values = true)]
    pub shock: Option<Decimal>,

    /// Horizon for positions that have not exited (YYYY-MM-DD)
    #[arg(long)]
    pub cutoff: Option<NaiveDate>,

    /// Keep PIK interest rows in the return measures
    #[arg(long)]
    pub keep_pik: bool,

    /// Do not net OID and origination fees off outflows
    #[arg(long)]
    pub gross_of_upfront: bool,
}

impl SourceArgs {
    /// Load the ledger and curve. An explicit `--input` wins over CSV paths;
    /// with neither, piped JSON on stdin is used.
    pub fn load_input(&self) -> Result<PipelineInput, Box<dyn std::error::Error>> {
        if let Some(ref path) = self.input {
            return input::file::read_json(path);
        }

        if let Some(ref path) = self.ledger {
            let ledger = input::csv_in::read_ledger_csv(path)?;
            let curve = match self.curve {
                Some(ref curve_path) => input::csv_in::read_curve_csv(curve_path)?,
                None => Vec::new(),
            };
            return Ok(PipelineInput { ledger, curve });
        }

        if let Some(data) = input::stdin::read_stdin()? {
            return Ok(serde_json::from_value(data)?);
        }

        Err("--input <file.json>, --ledger <file.csv> or stdin required".into())
    }

    /// File configuration first, then command-line overrides on top.
    pub fn load_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config: PipelineConfig = match self.config {
            Some(ref path) => input::file::read_config(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(shock) = self.shock {
            config.rate_shock = shock;
        }
        if self.cutoff.is_some() {
            config.reporting_cutoff = self.cutoff;
        }
        if self.keep_pik {
            config.exclude_pik = false;
        }
        if self.gross_of_upfront {
            config.apply_upfront_fees = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flags_override_defaults() {
        let args = SourceArgs {
            shock: Some(dec!(0.01)),
            keep_pik: true,
            ..SourceArgs::default()
        };
        let config = args.load_config().unwrap();
        assert_eq!(config.rate_shock, dec!(0.01));
        assert!(!config.exclude_pik);
        assert!(config.apply_upfront_fees);
        assert!(config.reporting_cutoff.is_none());
    }

    #[test]
    fn test_out_of_range_shock_is_rejected() {
        let args = SourceArgs {
            shock: Some(dec!(1.5)),
            ..SourceArgs::default()
        };
        assert!(args.load_config().is_err());
    }
}
