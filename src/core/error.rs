use thiserror::Error;

/// Errors produced by the depletion engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TdbError {
    /// A parameter violated an ordering or range constraint at construction.
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },
    /// No finite number of years reaches the target with this contribution.
    #[error(
        "target {target:.2} cannot be reached with contribution {contribution:.2} at rate {rate}"
    )]
    UnreachableTarget {
        target: f64,
        rate: f64,
        contribution: f64,
    },
}

impl TdbError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}
