//! Error taxonomy for the sale engine and its backend.

use thiserror::Error;

/// Failures surfaced by a [`FundsBackend`](crate::backend::FundsBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance")]
    Insufficient,
    #[error("recipient rejected transfer")]
    Rejected,
    #[error("backend failure: {0}")]
    Other(String),
}

/// Every error a sale operation can return. All are synchronous; nothing is
/// retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaleError {
    #[error("not authorized")]
    Unauthorized,
    #[error("sale is paused")]
    Paused,
    #[error("sale is not active")]
    NotActive,
    #[error("amount below minimum purchase")]
    BelowMinimum,
    #[error("already finalized")]
    AlreadyFinalized,
    #[error("nothing to refund")]
    NothingToRefund,
    #[error("per-buyer allowance exhausted")]
    InsufficientAllowance,
    #[error("sale has not ended")]
    SaleNotEnded,
    #[error("escrow is not refunding")]
    NotRefunding,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("no tier {0}")]
    InvalidTier(usize),
    #[error("presale allocation exceeded")]
    PresaleAllocationExceeded,
    #[error("insufficient token balance")]
    InsufficientBalance,
    #[error("allowance exceeded")]
    AllowanceExceeded,
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}
