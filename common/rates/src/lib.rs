//! Piecewise-linear interest-rate model.
//!
//! Pure function of a reserve's liquidity state: no storage, no side effects.
//! `SPEC_FULL.md` §4.2 keeps this the way the teacher's `common-rates` crate keeps
//! it — a standalone module a `Reserve` carries by value — but collapses the
//! teacher's three-slope, Taylor-series-compounded model down to the single-kink
//! linear model the reference engine (`original_source`) actually implements.

use market_constants::scale;
use market_errors::EngineError;
use market_math::FixedMath;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Configuration for one reserve's interest-rate curve, all fields `SCALE`-precision
/// (`10^27`). `optimal_rate` is the utilization at which the curve's slope jumps
/// from `slope_0` to `slope_0 + slope_1` (the "kink").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrmParams {
    pub slope_0: U256,
    pub slope_1: U256,
    pub y_intercept: U256,
    pub optimal_rate: U256,
}

impl IrmParams {
    /// `optimal_rate` must lie in `(0, SCALE]`; everything else the reference
    /// model leaves unconstrained.
    pub fn new(
        slope_0: U256,
        slope_1: U256,
        y_intercept: U256,
        optimal_rate: U256,
    ) -> Result<Self, EngineError> {
        if optimal_rate.is_zero() || optimal_rate > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        Ok(Self {
            slope_0,
            slope_1,
            y_intercept,
            optimal_rate,
        })
    }
}

/// `(borrow_rate, lending_rate)`, both `SCALE`-precision annualized rates.
pub type Rates = (U256, U256);

/// Interest-rate model: stateless, takes reserve liquidity and curve parameters,
/// returns the two annualized rates a reserve accrues at.
///
/// `utilization = total_debt / (reserve_balance + total_debt)`. Below the kink the
/// borrow rate rises linearly from `y_intercept` toward `y_intercept + slope_0`;
/// above it, linearly from there toward `y_intercept + slope_0 + slope_1`. The
/// lending rate is the borrow rate scaled by utilization (the reserve factor is
/// applied later, by `Market`, when splitting accrued interest with the treasury —
/// not here).
pub fn rates(
    reserve_balance: U256,
    total_debt: U256,
    params: &IrmParams,
) -> Result<Rates, EngineError> {
    let total = FixedMath::add(reserve_balance, total_debt)?;
    if total.is_zero() {
        return Ok((params.y_intercept, U256::zero()));
    }

    let utilization = FixedMath::div_fp(total_debt, total)?;

    let borrow_rate = if utilization <= params.optimal_rate {
        let slope_contribution = FixedMath::div_fp(
            FixedMath::mul_fp(params.slope_0, utilization)?,
            params.optimal_rate,
        )?;
        FixedMath::add(params.y_intercept, slope_contribution)?
    } else {
        let excess_utilization = FixedMath::sub(utilization, params.optimal_rate)?;
        let remaining_range = FixedMath::sub(scale(), params.optimal_rate)?;
        let slope_contribution = FixedMath::div_fp(
            FixedMath::mul_fp(params.slope_1, excess_utilization)?,
            remaining_range,
        )?;
        FixedMath::add(
            FixedMath::add(params.y_intercept, params.slope_0)?,
            slope_contribution,
        )?
    };

    let lending_rate = FixedMath::mul_fp(borrow_rate, utilization)?;

    Ok((borrow_rate, lending_rate))
}
