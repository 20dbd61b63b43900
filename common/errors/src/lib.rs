//! Error catalogue for the lending market engine.
//!
//! Every fallible entry point in [`lending_market`](../market/index.html) returns
//! `Result<T, EngineError>`. No variant is swallowed internally; a failure at any
//! step of a `Market` operation propagates out and the caller's state is left
//! untouched (see `SPEC_FULL.md` §7).

use thiserror::Error;

/// A reserve index, as referenced by `CollateralMask`'s bit position.
pub type ReserveIndex = u8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("caller is not authorized to perform this action")]
    Unauthorized,

    #[error("reserve {0:?} is not registered")]
    UnknownReserve(String),

    #[error("reserve {0:?} is already registered")]
    DuplicateReserve(String),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error(
        "insufficient collateral: collateral_value={collateral_value} < required_value={required_value}"
    )]
    InsufficientCollateral {
        collateral_value: String,
        required_value: String,
    },

    #[error("liquidation would leave the borrower over-collateralized past required value")]
    InvalidLiquidation,

    #[error("flash loan receiver did not repay {expected} (market balance only grew by {actual})")]
    InsufficientRepaid { expected: String, actual: String },

    #[error("transfer amount exceeds the spender's remaining allowance")]
    AllowanceExceeded,

    #[error("addition overflow")]
    AddOverflow,

    #[error("subtraction underflow")]
    SubUnderflow,

    #[error("multiplication overflow")]
    MulOverflow,

    #[error("division by zero")]
    DivByZero,

    #[error("value out of range for the target integer width")]
    SafeCastOutOfRange,

    #[error("reserve {0:?} is mid flash-loan callback and cannot be re-entered")]
    Reentrancy(String),

    #[error("oracle price for {0:?} is stale")]
    OracleStale(String),

    #[error("oracle reported a zero price for {0:?}")]
    PriceZero(String),

    #[error("reserve {0:?} is paused")]
    Paused(String),

    #[error("the underlying asset transfer failed: {0}")]
    AssetLedger(String),
}
