//! The master cashflow ledger consumed by aggregation and financing.
//!
//! Rows arrive already cleaned and merged (facility → deal → fund structure,
//! fund leverage terms, facility upfront-fee terms). The only mutation the
//! core performs on an existing row is the sign convention; financing rows
//! are appended, never merged into existing ones.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Bps, Currency, Money, Rate};

/// Cash flow classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashflowType {
    Contribution,
    Interest,
    PrincipalReturn,
    PikInterest,
    UndrawnFee,
    ExitFee,
}

impl CashflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashflowType::Contribution => "contribution",
            CashflowType::Interest => "interest",
            CashflowType::PrincipalReturn => "principal_return",
            CashflowType::PikInterest => "pik_interest",
            CashflowType::UndrawnFee => "undrawn_fee",
            CashflowType::ExitFee => "exit_fee",
        }
    }

    /// Contributions are the only capital outflow from the investor's side.
    pub fn is_outflow(&self) -> bool {
        matches!(self, CashflowType::Contribution)
    }
}

impl fmt::Display for CashflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fund-level leverage terms attached to each ledger row by the upstream merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageTerms {
    /// Share of each contribution financed by the credit facility (0.6 = 60%).
    pub advance_rate: Rate,
    /// Total fund commitment.
    pub commitment: Money,
    /// Curve the facility floats over (e.g. "sofr").
    pub cost_of_funds_curve: String,
    /// Facility spread over the curve, in basis points.
    pub spread_bps: Bps,
    /// Fee on undrawn capacity, in basis points.
    pub undrawn_fee_bps: Bps,
}

/// Day-one yield adjustments on a facility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpfrontFees {
    #[serde(default)]
    pub oid_bps: Bps,
    #[serde(default)]
    pub origination_fee_bps: Bps,
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowRecord {
    /// Facility identifier. `None` on fund-level rows such as financing fees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    pub fund: String,
    pub asof: NaiveDate,
    pub cashflow_type: CashflowType,
    pub amount: Money,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<LeverageTerms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upfront: Option<UpfrontFees>,
}

impl CashflowRecord {
    /// A bare fund-level row with no facility, deal, or term attachments.
    pub fn fund_level(
        fund: impl Into<String>,
        asof: NaiveDate,
        cashflow_type: CashflowType,
        amount: Money,
    ) -> Self {
        Self {
            entity_id: None,
            entity_type: None,
            deal_id: None,
            fund: fund.into(),
            asof,
            cashflow_type,
            amount,
            currency: Currency::default(),
            facility_name: None,
            deal_name: None,
            terms: None,
            upfront: None,
        }
    }

    /// A facility-level row.
    pub fn facility(
        entity_id: impl Into<String>,
        deal_id: impl Into<String>,
        fund: impl Into<String>,
        asof: NaiveDate,
        cashflow_type: CashflowType,
        amount: Money,
    ) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            deal_id: Some(deal_id.into()),
            ..Self::fund_level(fund, asof, cashflow_type, amount)
        }
    }

    pub fn with_terms(mut self, terms: LeverageTerms) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn with_upfront(mut self, upfront: UpfrontFees) -> Self {
        self.upfront = Some(upfront);
        self
    }

    pub fn with_names(mut self, facility_name: &str, deal_name: &str) -> Self {
        self.facility_name = Some(facility_name.to_string());
        self.deal_name = Some(deal_name.to_string());
        self
    }
}

/// Apply the canonical sign convention: contributions negative, everything
/// else positive. Idempotent.
pub fn normalize_signs(ledger: &[CashflowRecord]) -> Vec<CashflowRecord> {
    ledger
        .iter()
        .map(|row| {
            let magnitude = row.amount.abs();
            let amount = if row.cashflow_type.is_outflow() {
                -magnitude
            } else {
                magnitude
            };
            CashflowRecord {
                amount,
                ..row.clone()
            }
        })
        .collect()
}

/// Count of rows whose sign differs from the convention.
pub fn sign_violations(ledger: &[CashflowRecord]) -> usize {
    ledger
        .iter()
        .filter(|row| {
            if row.cashflow_type.is_outflow() {
                row.amount > Decimal::ZERO
            } else {
                row.amount < Decimal::ZERO
            }
        })
        .count()
}
