//! Accumulator synchronization and rate recomputation (spec.md §4.4).
//!
//! Every operation that touches a reserve calls [`Market::touch_reserve`]
//! first: it advances both running accumulators to `now`, mints the
//! treasury's share of the interest just accrued, and then recomputes the
//! reserve's instantaneous borrow/lending rates from its post-accrual
//! liquidity. Grounded on the teacher's `lending_pool::utils::update_interest`
//! (accumulator advance) and `controller::aggregator::compute_rates`
//! (rate recompute), here fused into one step since both contracts collapse
//! into a single `Market` in this port.

use asset_ledger::AssetLedger;
use market_constants::{scale, SECONDS_PER_YEAR};
use market_errors::EngineError;
use market_events::{Event, EventSink};
use market_math::{FixedMath, SafeMath};
use market_structs::ReserveIndex;
use primitive_types::U256;

use crate::solvency::ConstAccumulator;
use crate::Market;

impl Market {
    /// Advances `index`'s `lending_accumulator`/`debt_accumulator` to `now`
    /// and mints the treasury's cut of the interest generated. A no-op if
    /// `now` has not advanced past the reserve's last sync.
    ///
    /// `debt_accumulator` does not grow while `raw_total_debt` is zero
    /// (spec.md §4.4 P4 / §8 scenario 5) even though the borrow rate itself
    /// is nonzero at zero utilization (`y_intercept`) — there is no
    /// outstanding debt for that rate to compound against.
    pub fn synchronize(&mut self, index: ReserveIndex, now: u64, sink: &dyn EventSink) -> Result<(), EngineError> {
        let reserve = self.reserve(index)?;
        if now <= reserve.last_update_ts {
            return Ok(());
        }
        let delta = now - reserve.last_update_ts;
        let debt_accumulator_old = reserve.debt_accumulator;
        let lending_accumulator_old = reserve.lending_accumulator;
        let borrow_rate = reserve.current_borrowing_rate;
        let lending_rate = reserve.current_lending_rate;
        let reserve_factor = reserve.reserve_factor;
        let raw_total_debt = reserve.raw_total_debt;
        let token = reserve.token.clone();

        let debt_accumulator_new = if raw_total_debt.is_zero() {
            debt_accumulator_old
        } else {
            let growth = FixedMath::div(FixedMath::mul(borrow_rate, U256::from(delta))?, U256::from(SECONDS_PER_YEAR))?;
            FixedMath::mul_fp(debt_accumulator_old, FixedMath::add(scale(), growth)?)?
        };

        let retained_lending_rate = FixedMath::mul_fp(lending_rate, FixedMath::sub(scale(), reserve_factor)?)?;
        let lending_growth = FixedMath::div(
            FixedMath::mul(retained_lending_rate, U256::from(delta))?,
            U256::from(SECONDS_PER_YEAR),
        )?;
        let lending_accumulator_new =
            FixedMath::mul_fp(lending_accumulator_old, FixedMath::add(scale(), lending_growth)?)?;

        let debt_accumulator_delta = FixedMath::sub(debt_accumulator_new, debt_accumulator_old)?;
        let interest_accrued = FixedMath::mul_fp(raw_total_debt, debt_accumulator_delta)?;
        let protocol_interest = FixedMath::mul_fp(interest_accrued, reserve_factor)?;

        if !protocol_interest.is_zero() {
            let treasury = self.config.treasury.clone();
            self.z_tokens[index as usize].mint(&treasury, protocol_interest, &ConstAccumulator(lending_accumulator_new))?;
        }

        let reserve = self.reserve_mut(index)?;
        reserve.debt_accumulator = debt_accumulator_new;
        reserve.lending_accumulator = lending_accumulator_new;
        reserve.last_update_ts = now;

        sink.emit(Event::InterestAccrued {
            token,
            index,
            lending_accumulator: lending_accumulator_new,
            debt_accumulator: debt_accumulator_new,
            borrow_rate,
            lending_rate,
        });
        tracing::debug!(reserve = index, delta, "accumulators synchronized");
        Ok(())
    }

    /// Recomputes `index`'s instantaneous borrow/lending rates from its
    /// current `AssetLedger` liquidity and outstanding debt. Always runs
    /// (unlike `synchronize`, it is not gated on `now` advancing) since a
    /// deposit/withdraw/borrow/repay changes liquidity without changing time.
    pub fn recompute_rates(&mut self, index: ReserveIndex, ledger: &dyn AssetLedger, _sink: &dyn EventSink) -> Result<(), EngineError> {
        let reserve = self.reserve(index)?;
        let token = reserve.token.clone();
        let reserve_balance = ledger.balance_of(&self.config.self_id, &token);
        self.apply_rates(index, reserve_balance)
    }

    /// Core of [`Self::recompute_rates`], taking the reserve's liquidity
    /// directly instead of reading it off the ledger. `ops.rs` uses this to
    /// rebase rates on a *projected* post-transfer balance before the
    /// ledger call that would actually produce it — so the irreversible
    /// `AssetLedger` call stays the last fallible step of a `try_*`.
    pub(crate) fn apply_rates(&mut self, index: ReserveIndex, reserve_balance: U256) -> Result<(), EngineError> {
        let reserve = self.reserve(index)?;
        let raw_total_debt = reserve.raw_total_debt;
        let debt_accumulator = reserve.debt_accumulator;
        let irm = reserve.irm;

        let total_debt = FixedMath::mul_fp(raw_total_debt, debt_accumulator)?;
        let (borrow_rate, lending_rate) = market_rates::rates(reserve_balance, total_debt, &irm)?;

        let reserve = self.reserve_mut(index)?;
        reserve.current_borrowing_rate = borrow_rate;
        reserve.current_lending_rate = lending_rate;
        tracing::debug!(reserve = index, %borrow_rate, %lending_rate, "rates recomputed");
        Ok(())
    }

    /// `synchronize` then `recompute_rates` — the pairing every operation in
    /// `ops.rs` performs on every reserve it touches.
    pub fn touch_reserve(&mut self, index: ReserveIndex, now: u64, ledger: &dyn AssetLedger, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.synchronize(index, now, sink)?;
        self.recompute_rates(index, ledger, sink)
    }
}
