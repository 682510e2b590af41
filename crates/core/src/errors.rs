//! Error types

use thiserror::Error;

use crate::{Denom, PoolId};

/// Fixed-point parsing and arithmetic errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    #[error("Invalid decimal string: {0}")]
    InvalidFormat(String),

    #[error("Too many fractional digits in {input}: max {max}")]
    PrecisionExceeded { input: String, max: usize },

    #[error("Decimal overflow")]
    Overflow,

    #[error("Precision {0} is out of range for a scaling factor")]
    PrecisionOutOfRange(u32),
}

/// Valuation errors raised by the strict capitalization primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Price for {denom} is zero")]
    ZeroPrice { denom: Denom },

    #[error("Scaling factor for {denom} is zero")]
    ZeroScalingFactor { denom: Denom },

    #[error("Truncation occurred when pricing {amount} of {denom}")]
    TruncatedToZero { denom: Denom, amount: String },

    #[error("Overflow when pricing {denom}")]
    Overflow { denom: Denom },
}

/// Failures of injected collaborators (registries, price sources)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("Pool not found: {0}")]
    PoolNotFound(PoolId),

    #[error("Scaling factor not found for {0}")]
    ScalingFactorNotFound(Denom),

    #[error("Price source error: {0}")]
    PriceSource(String),

    #[error("Collaborator I/O error: {0}")]
    Io(String),
}

/// Errors surfaced by a repricing cycle
#[derive(Debug, Error)]
pub enum RepricingError {
    #[error("Collaborator I/O failed: {0}")]
    CollaboratorIo(#[from] CollaboratorError),

    #[error("Repricing for height {height} exceeded its deadline")]
    DeadlineExceeded { height: u64 },
}

/// Result type alias
pub type DecimalResult<T> = Result<T, DecimalError>;
pub type PricingResult<T> = Result<T, PricingError>;
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;
pub type RepricingResult<T> = Result<T, RepricingError>;
