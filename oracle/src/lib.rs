//! Price oracle interface and the decimal-normalizing adapter `Market` reads
//! through.
//!
//! `Market` never talks to a price feed directly — every reserve's price
//! lookup goes through [`PriceOracleAdapter`], which normalizes whatever
//! native precision the upstream feed uses down to the engine's fixed
//! 8-decimal convention and rejects stale quotes before they reach solvency
//! arithmetic. Grounded on the teacher's `price_aggregator` module, which
//! plays the same "external feed, normalized on read" role for the
//! controller's oracle cache.

use market_constants::PRICE_DECIMALS;
use market_errors::EngineError;
use market_structs::TokenId;
use primitive_types::U256;

/// A third-party price feed, external to this engine. Implementations may
/// wrap an on-chain aggregator, an HTTP price service, or (in tests) a
/// fixed table.
pub trait PriceOracle {
    /// Returns `(price, update_ts)` in the feed's own native decimals.
    fn get_price(&self, token: &TokenId) -> Result<(u128, u64), EngineError>;

    /// Decimal precision the feed's raw price is expressed in.
    fn native_decimals(&self, token: &TokenId) -> u32;
}

/// How old a quote may be, in seconds, before [`PriceOracleAdapter::price`]
/// rejects it with `OracleStale`.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    pub max_age_secs: u64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self { max_age_secs: 3_600 }
    }
}

/// Object-safe facade over [`PriceOracleAdapter`] so `market::Market` can take
/// a price source as `&dyn PriceSource` instead of being generic over the
/// concrete feed implementation (`Market` is otherwise free of type
/// parameters — see `SPEC_FULL.md` §9 "dynamic-dispatch surface").
pub trait PriceSource {
    fn price(&self, token: &TokenId, now: u64) -> Result<U256, EngineError>;
}

/// Normalizes an upstream [`PriceOracle`] to the engine's fixed 8-decimal
/// convention and enforces a staleness bound before handing a price to
/// solvency arithmetic.
pub struct PriceOracleAdapter<O> {
    inner: O,
    staleness: StalenessPolicy,
}

impl<O: PriceOracle> PriceOracleAdapter<O> {
    pub fn new(inner: O, staleness: StalenessPolicy) -> Self {
        Self { inner, staleness }
    }

    /// Returns the 8-decimal-normalized price for `token` at `now`, failing
    /// `PriceZero` on a zero quote and `OracleStale` if the feed's last
    /// update is older than the configured policy allows.
    pub fn price(&self, token: &TokenId, now: u64) -> Result<U256, EngineError> {
        let (raw, update_ts) = self.inner.get_price(token)?;
        if raw == 0 {
            return Err(EngineError::PriceZero(token.0.clone()));
        }
        if now.saturating_sub(update_ts) > self.staleness.max_age_secs {
            tracing::warn!(token = %token, update_ts, now, "oracle price stale");
            return Err(EngineError::OracleStale(token.0.clone()));
        }
        let native_decimals = self.inner.native_decimals(token);
        Ok(normalize(raw, native_decimals))
    }
}

impl<O: PriceOracle> PriceSource for PriceOracleAdapter<O> {
    fn price(&self, token: &TokenId, now: u64) -> Result<U256, EngineError> {
        self.price(token, now)
    }
}

/// `normalized = raw × 10^(8−d)` if `d ≤ 8`, else `raw / 10^(d−8)`.
fn normalize(raw: u128, native_decimals: u32) -> U256 {
    let raw = U256::from(raw);
    if native_decimals <= PRICE_DECIMALS {
        raw * market_constants::u256_pow10(PRICE_DECIMALS - native_decimals)
    } else {
        raw / market_constants::u256_pow10(native_decimals - PRICE_DECIMALS)
    }
}
