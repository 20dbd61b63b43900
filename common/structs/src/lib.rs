//! Shared value types for the lending market engine: identifiers, the
//! per-reserve accounting record, and the small bitset used to track which
//! reserves a user has opted into as collateral.
//!
//! Grounded on the teacher's `common-structs` crate, which plays the same
//! role (plain data, no behavior beyond construction helpers) for its own
//! position/reserve model.

use market_constants::scale;
use market_errors::EngineError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// A borrower/lender identity. Concrete string wrapper rather than a generic
/// parameter — the engine never needs to be generic over address
/// representations, only over the collaborators (`AssetLedger`,
/// `PriceOracle`) that resolve what a `UserId` owns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An underlying token identity (the asset a reserve wraps).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bit position of a reserve within a user's collateral set, `0..64`. The
/// engine caps reserve count at 64 so a single `u64` mask can represent
/// "which reserves is this user using as collateral" without a heap
/// allocation per user.
pub use market_errors::ReserveIndex;

pub const MAX_RESERVES: u8 = 64;

/// Bitset over up to 64 reserves, recording which ones a user has enabled
/// as collateral. Enabling/disabling is explicit (spec.md §9 Open Question
/// resolution: deposits are never auto-enabled as collateral).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollateralMask(pub u64);

impl CollateralMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, index: ReserveIndex) -> bool {
        self.0 & (1u64 << index) != 0
    }

    pub fn set(&mut self, index: ReserveIndex) {
        self.0 |= 1u64 << index;
    }

    pub fn clear(&mut self, index: ReserveIndex) {
        self.0 &= !(1u64 << index);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates the set bits in ascending index order.
    pub fn iter(self) -> impl Iterator<Item = ReserveIndex> {
        let bits = self.0;
        (0..MAX_RESERVES).filter(move |i| bits & (1u64 << i) != 0)
    }
}

/// Per-reserve accounting record: the curve parameters, the two running
/// accumulators, and the bookkeeping the engine needs to accrue interest and
/// evaluate solvency. One `Reserve` exists per listed asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reserve {
    pub token: TokenId,
    /// Bit position of this reserve in every user's `CollateralMask`.
    pub index: ReserveIndex,
    /// Decimal precision of the underlying token (as tracked by `AssetLedger`).
    pub decimals: u32,

    /// Fraction (`SCALE`-precision) of this reserve's USD value that counts
    /// toward a user's collateral value when deposited.
    pub collateral_factor: U256,
    /// Divisor (`SCALE`-precision) that inflates the USD cost of debt
    /// denominated in this reserve.
    pub borrow_factor: U256,
    /// Fraction of accrued borrow interest retained as protocol reserves
    /// rather than passed through to lenders.
    pub reserve_factor: U256,
    /// Fraction of a flash-borrowed amount charged as a fee.
    pub flash_loan_fee: U256,

    pub irm: market_rates::IrmParams,

    /// Cumulative growth factor for raw deposit balances, `SCALE`-precision,
    /// monotonically non-decreasing.
    pub lending_accumulator: U256,
    /// Cumulative growth factor for raw debt balances, `SCALE`-precision,
    /// monotonically non-decreasing.
    pub debt_accumulator: U256,
    /// Last computed annualized borrow rate, `SCALE`-precision.
    pub current_borrowing_rate: U256,
    /// Last computed annualized lending rate, `SCALE`-precision.
    pub current_lending_rate: U256,
    /// Sum of raw (unscaled) debt across all borrowers of this reserve.
    pub raw_total_debt: U256,

    pub last_update_ts: u64,

    /// Reentrancy guard held for the duration of a flash loan against this
    /// reserve (spec.md §4.7).
    pub flash_loan_guard: bool,
    /// Administrative pause: blocks deposit/withdraw/borrow/repay/liquidate
    /// when set, but never blocks accrual itself.
    pub paused: bool,
}

impl Reserve {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token: TokenId,
        index: ReserveIndex,
        decimals: u32,
        collateral_factor: U256,
        borrow_factor: U256,
        reserve_factor: U256,
        flash_loan_fee: U256,
        irm: market_rates::IrmParams,
        now: u64,
    ) -> Result<Self, EngineError> {
        if index >= MAX_RESERVES {
            return Err(EngineError::SafeCastOutOfRange);
        }
        if collateral_factor > scale() || borrow_factor > scale() || reserve_factor > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        Ok(Self {
            token,
            index,
            decimals,
            collateral_factor,
            borrow_factor,
            reserve_factor,
            flash_loan_fee,
            irm,
            lending_accumulator: scale(),
            debt_accumulator: scale(),
            current_borrowing_rate: U256::zero(),
            current_lending_rate: U256::zero(),
            raw_total_debt: U256::zero(),
            last_update_ts: now,
            flash_loan_guard: false,
            paused: false,
        })
    }
}

/// A single borrower's outstanding raw debt in one reserve. Raw units grow
/// implicitly as `debt_accumulator` advances; `face = raw * debt_accumulator
/// / SCALE` is the amount actually owed at any instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDebt {
    pub raw_amount: U256,
}

impl UserDebt {
    pub fn is_empty(self) -> bool {
        self.raw_amount.is_zero()
    }
}
