//! Numeric constants shared by every crate in the lending market engine.

use primitive_types::U256;

/// Fixed-point scale used by [`market_math::FixedMath`]: 27 decimals, matching the
/// reference engine's "ray" precision.
pub const SCALE_DECIMALS: u32 = 27;

/// `10^27`, as a `U256`. All reserve accumulators and rate fields live in this unit.
pub fn scale() -> U256 {
    u256_pow10(SCALE_DECIMALS)
}

/// Oracle prices are normalized to 8 decimals regardless of the upstream feed's
/// native precision.
pub const PRICE_DECIMALS: u32 = 8;

/// Internal normalization target for solvency arithmetic (collateral/required
/// value comparisons), expressed as decimals on top of the 8-decimal price.
pub const SOLVENCY_DECIMALS: u32 = 18;

/// Seconds in a reference (non-leap) year, used to annualize interest rates.
pub const SECONDS_PER_YEAR: u64 = 365 * 86_400;

/// `10^n` as a `U256`, used pervasively for decimal-boundary crossings.
pub fn u256_pow10(n: u32) -> U256 {
    U256::from(10u64).pow(U256::from(n))
}
