pub mod adjustments;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod ledger;
pub mod metrics;
pub mod observe;
pub mod time_value;
pub mod types;

#[cfg(feature = "leverage")]
pub mod calendar;

#[cfg(feature = "leverage")]
pub mod financing;

#[cfg(feature = "leverage")]
pub mod pipeline;

pub use error::CreditPerfError;
pub use types::*;

/// Standard result type for all credit-perf operations
pub type CreditPerfResult<T> = Result<T, CreditPerfError>;
