use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CreditPerfError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Dimension mismatch: {left} cash flows vs {right} dates")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Invalid cash flow set: {0}")]
    InvalidCashflowSet(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for CreditPerfError {
    fn from(e: serde_json::Error) -> Self {
        CreditPerfError::SerializationError(e.to_string())
    }
}
