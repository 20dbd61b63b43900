//! Fixed-point and checked integer arithmetic for the lending market engine.
//!
//! Two layers, both over [`primitive_types::U256`]:
//!
//! - [`SafeMath`]: checked `add`/`sub`/`mul`/`div` over the full `U256` domain.
//! - [`FixedMath`]: 27-decimal (`SCALE = 10^27`) fixed-point `mul`/`div`, plus the
//!   `*_decimals` variants used to cross token-decimal boundaries.
//!
//! Rounding is always truncating (toward zero) — see `SPEC_FULL.md` §4.1 and §9.
//! This is load-bearing: scenario 3 in spec.md §8 asserts an exact +1 residual-debt
//! artifact that only appears under truncation, not under round-half-up or
//! round-half-even.

use market_constants::scale;
use market_errors::EngineError;
use primitive_types::U256;

/// Checked arithmetic over the full `U256` domain.
///
/// The reference engine bounds intermediates to a 252-bit prime field; this port
/// uses native `U256` overflow as its bound instead (see `SPEC_FULL.md` §4.1 / §9),
/// which is the more idiomatic choice off-chain and strictly more permissive, so
/// every value the reference engine accepts is still accepted here.
pub struct SafeMath;

impl SafeMath {
    pub fn add(a: U256, b: U256) -> Result<U256, EngineError> {
        a.checked_add(b).ok_or(EngineError::AddOverflow)
    }

    pub fn sub(a: U256, b: U256) -> Result<U256, EngineError> {
        a.checked_sub(b).ok_or(EngineError::SubUnderflow)
    }

    pub fn mul(a: U256, b: U256) -> Result<U256, EngineError> {
        a.checked_mul(b).ok_or(EngineError::MulOverflow)
    }

    pub fn div(a: U256, b: U256) -> Result<U256, EngineError> {
        if b.is_zero() {
            return Err(EngineError::DivByZero);
        }
        Ok(a / b)
    }
}

/// 27-decimal truncating fixed-point arithmetic (`SCALE = 10^27`).
pub struct FixedMath;

impl FixedMath {
    /// `a + b`, checked.
    pub fn add(a: U256, b: U256) -> Result<U256, EngineError> {
        SafeMath::add(a, b)
    }

    /// `a - b`, checked.
    pub fn sub(a: U256, b: U256) -> Result<U256, EngineError> {
        SafeMath::sub(a, b)
    }

    /// `a * b`, checked.
    pub fn mul(a: U256, b: U256) -> Result<U256, EngineError> {
        SafeMath::mul(a, b)
    }

    /// Truncating `a / b`.
    pub fn div(a: U256, b: U256) -> Result<U256, EngineError> {
        SafeMath::div(a, b)
    }

    /// `floor(a * b / SCALE)`.
    pub fn mul_fp(a: U256, b: U256) -> Result<U256, EngineError> {
        let product = SafeMath::mul(a, b)?;
        Ok(product / scale())
    }

    /// `floor(a * SCALE / b)`.
    pub fn div_fp(a: U256, b: U256) -> Result<U256, EngineError> {
        if b.is_zero() {
            return Err(EngineError::DivByZero);
        }
        let numerator = SafeMath::mul(a, scale())?;
        Ok(numerator / b)
    }

    /// Ceiling variant of [`Self::div_fp`]: `ceil(a * SCALE / b)`. Used by
    /// `borrow` so raw debt is never under-accounted (spec.md §4.6).
    pub fn div_fp_ceil(a: U256, b: U256) -> Result<U256, EngineError> {
        if b.is_zero() {
            return Err(EngineError::DivByZero);
        }
        let numerator = SafeMath::mul(a, scale())?;
        let (quotient, remainder) = numerator.div_mod(b);
        if remainder.is_zero() {
            Ok(quotient)
        } else {
            SafeMath::add(quotient, U256::one())
        }
    }

    /// `floor(a * b / 10^decimals)`, for crossing a token's own decimal precision
    /// rather than the engine's `SCALE`.
    pub fn mul_decimals(a: U256, b: U256, decimals: u32) -> Result<U256, EngineError> {
        let product = SafeMath::mul(a, b)?;
        Ok(product / market_constants::u256_pow10(decimals))
    }

    /// `floor(a * 10^decimals / b)`.
    pub fn div_decimals(a: U256, b: U256, decimals: u32) -> Result<U256, EngineError> {
        if b.is_zero() {
            return Err(EngineError::DivByZero);
        }
        let numerator = SafeMath::mul(a, market_constants::u256_pow10(decimals))?;
        Ok(numerator / b)
    }
}
