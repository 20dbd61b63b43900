//! The interest-bearing share token ("z-token") for a single reserve.
//!
//! Stores *raw* balances only; every face-value query rescales by the
//! reserve's current lending accumulator, which [`Market`](../market/index.html)
//! advances in `synchronize` without ever touching raw storage (`SPEC_FULL.md`
//! §4.3/§4.4). Grounded on the raw/index balance split in the teacher's
//! `liquidity_pool/src/liquidity.rs` (`DepositPosition::amount` +
//! `initial_supply_index`), collapsed here into a single running accumulator
//! per reserve instead of a per-position snapshot index, per spec.md's design.
//!
//! Mint/burn are reachable only through `&mut ZTokenState`, which only
//! `market::Market` holds — there is no separate in-crate authorization check
//! (spec.md §4.3's `Unauthorized` reject for non-Market callers collapses into
//! Rust's ownership model; see `DESIGN.md`).

use market_constants::scale;
use market_errors::EngineError;
use market_events::{Event, EventSink};
use market_math::{FixedMath, SafeMath};
use market_structs::{ReserveIndex, UserId};
use primitive_types::U256;
use std::collections::HashMap;

/// Narrow capability `ZTokenState` needs from `Market`: the reserve's current
/// lending accumulator, and a solvency check for the account a transfer would
/// debit. Passed in at each call rather than held as a back-pointer, per the
/// design note in spec.md §9 ("share-token <-> market coupling").
pub trait MarketView {
    fn lending_accumulator(&self, reserve: ReserveIndex) -> Result<U256, EngineError>;

    /// Must succeed iff `user` would remain solvent after `reserve`'s face
    /// balance drops by `face_amount_removed`. Called before every transfer,
    /// `transfer_all`, and `transfer_from` that moves shares out of an
    /// account's control (spec.md §4.3: "Before completing, Market is
    /// consulted for the sender's solvency").
    fn assert_solvent_after_decrease(
        &self,
        user: &UserId,
        reserve: ReserveIndex,
        face_amount_removed: U256,
    ) -> Result<(), EngineError>;
}

/// Per-reserve share-token ledger: raw balances, raw total supply, and face-
/// unit allowances. One instance exists per `Reserve`.
#[derive(Debug, Clone)]
pub struct ZTokenState {
    reserve: ReserveIndex,
    raw_balances: HashMap<UserId, U256>,
    raw_total_supply: U256,
    /// Face-unit allowances, fixed at `approve` time — not rescaled as the
    /// accumulator grows (spec.md §4.3).
    allowances: HashMap<(UserId, UserId), U256>,
}

impl ZTokenState {
    pub fn new(reserve: ReserveIndex) -> Self {
        Self {
            reserve,
            raw_balances: HashMap::new(),
            raw_total_supply: U256::zero(),
            allowances: HashMap::new(),
        }
    }

    pub fn reserve(&self) -> ReserveIndex {
        self.reserve
    }

    pub fn raw_balance_of(&self, user: &UserId) -> U256 {
        *self.raw_balances.get(user).unwrap_or(&U256::zero())
    }

    pub fn raw_total_supply(&self) -> U256 {
        self.raw_total_supply
    }

    /// `floor(raw_balance(user) * accumulator / SCALE)`.
    pub fn balance_of(&self, user: &UserId, market: &dyn MarketView) -> Result<U256, EngineError> {
        let accumulator = market.lending_accumulator(self.reserve)?;
        FixedMath::mul_fp(self.raw_balance_of(user), accumulator)
    }

    /// `floor(raw_total_supply * accumulator / SCALE)`.
    pub fn total_supply(&self, market: &dyn MarketView) -> Result<U256, EngineError> {
        let accumulator = market.lending_accumulator(self.reserve)?;
        FixedMath::mul_fp(self.raw_total_supply, accumulator)
    }

    pub fn allowance(&self, owner: &UserId, spender: &UserId) -> U256 {
        *self
            .allowances
            .get(&(owner.clone(), spender.clone()))
            .unwrap_or(&U256::zero())
    }

    pub fn approve(
        &mut self,
        owner: &UserId,
        spender: &UserId,
        face_amount: U256,
        sink: &dyn EventSink,
    ) {
        self.allowances
            .insert((owner.clone(), spender.clone()), face_amount);
        sink.emit(Event::Approval {
            index: self.reserve,
            owner: owner.clone(),
            spender: spender.clone(),
            face_amount,
        });
    }

    fn consume_allowance(
        &mut self,
        owner: &UserId,
        spender: &UserId,
        face_amount: U256,
    ) -> Result<(), EngineError> {
        let remaining = self.allowance(owner, spender);
        if remaining < face_amount {
            return Err(EngineError::AllowanceExceeded);
        }
        self.allowances
            .insert((owner.clone(), spender.clone()), remaining - face_amount);
        Ok(())
    }

    /// Moves `face_amount` of shares from `from` to `to`, checking `from`'s
    /// post-transfer solvency first. Emits `Transfer` then `RawTransfer`.
    pub fn transfer(
        &mut self,
        from: &UserId,
        to: &UserId,
        face_amount: U256,
        market: &dyn MarketView,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Ok(());
        }
        market.assert_solvent_after_decrease(from, self.reserve, face_amount)?;
        let accumulator = market.lending_accumulator(self.reserve)?;
        let raw_amount = FixedMath::div_fp(face_amount, accumulator)?;
        self.move_raw(from, to, raw_amount)?;
        self.emit_transfer(from, to, raw_amount, accumulator, face_amount, sink);
        Ok(())
    }

    /// Moves the sender's entire raw balance, returning the face amount
    /// transferred (for event emission by the caller, per spec.md §4.3).
    pub fn transfer_all(
        &mut self,
        from: &UserId,
        to: &UserId,
        market: &dyn MarketView,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        let raw_amount = self.raw_balance_of(from);
        if raw_amount.is_zero() {
            return Ok(U256::zero());
        }
        let accumulator = market.lending_accumulator(self.reserve)?;
        let face_amount = FixedMath::mul_fp(raw_amount, accumulator)?;
        market.assert_solvent_after_decrease(from, self.reserve, face_amount)?;
        self.move_raw(from, to, raw_amount)?;
        self.emit_transfer(from, to, raw_amount, accumulator, face_amount, sink);
        Ok(face_amount)
    }

    /// `transfer` on behalf of `owner`, consuming `spender`'s allowance by the
    /// face amount moved.
    pub fn transfer_from(
        &mut self,
        spender: &UserId,
        owner: &UserId,
        to: &UserId,
        face_amount: U256,
        market: &dyn MarketView,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.consume_allowance(owner, spender, face_amount)?;
        self.transfer(owner, to, face_amount, market, sink)
    }

    /// Mints `floor(face_amount * SCALE / accumulator)` raw shares to `user`.
    /// Restricted to `Market` by construction: only `Market` holds `&mut
    /// ZTokenState`.
    pub fn mint(
        &mut self,
        user: &UserId,
        face_amount: U256,
        market: &dyn MarketView,
    ) -> Result<U256, EngineError> {
        let accumulator = market.lending_accumulator(self.reserve)?;
        let raw_amount = FixedMath::div_fp(face_amount, accumulator)?;
        let balance = self.raw_balance_of(user);
        self.raw_balances
            .insert(user.clone(), SafeMath::add(balance, raw_amount)?);
        self.raw_total_supply = SafeMath::add(self.raw_total_supply, raw_amount)?;
        Ok(raw_amount)
    }

    /// Burns `floor(face_amount * SCALE / accumulator)` raw shares from
    /// `user`. Fails `SubUnderflow` if `user` does not hold that many raw
    /// shares.
    pub fn burn(
        &mut self,
        user: &UserId,
        face_amount: U256,
        market: &dyn MarketView,
    ) -> Result<U256, EngineError> {
        let accumulator = market.lending_accumulator(self.reserve)?;
        let raw_amount = FixedMath::div_fp(face_amount, accumulator)?;
        self.debit_raw(user, raw_amount)?;
        Ok(raw_amount)
    }

    /// Burns `user`'s entire raw balance, returning the face value burned.
    pub fn burn_all(&mut self, user: &UserId, market: &dyn MarketView) -> Result<U256, EngineError> {
        let raw_amount = self.raw_balance_of(user);
        if raw_amount.is_zero() {
            return Ok(U256::zero());
        }
        let accumulator = market.lending_accumulator(self.reserve)?;
        let face_amount = FixedMath::mul_fp(raw_amount, accumulator)?;
        self.debit_raw(user, raw_amount)?;
        Ok(face_amount)
    }

    fn debit_raw(&mut self, user: &UserId, raw_amount: U256) -> Result<(), EngineError> {
        let balance = self.raw_balance_of(user);
        let remaining = SafeMath::sub(balance, raw_amount)?;
        if remaining.is_zero() {
            self.raw_balances.remove(user);
        } else {
            self.raw_balances.insert(user.clone(), remaining);
        }
        self.raw_total_supply = SafeMath::sub(self.raw_total_supply, raw_amount)?;
        Ok(())
    }

    fn move_raw(&mut self, from: &UserId, to: &UserId, raw_amount: U256) -> Result<(), EngineError> {
        let from_balance = self.raw_balance_of(from);
        let from_remaining = SafeMath::sub(from_balance, raw_amount)?;
        if from_remaining.is_zero() {
            self.raw_balances.remove(from);
        } else {
            self.raw_balances.insert(from.clone(), from_remaining);
        }
        let to_balance = self.raw_balance_of(to);
        self.raw_balances
            .insert(to.clone(), SafeMath::add(to_balance, raw_amount)?);
        Ok(())
    }

    fn emit_transfer(
        &self,
        from: &UserId,
        to: &UserId,
        raw_amount: U256,
        accumulator: U256,
        face_amount: U256,
        sink: &dyn EventSink,
    ) {
        sink.emit(Event::Transfer {
            index: self.reserve,
            from: from.clone(),
            to: to.clone(),
            face_amount,
        });
        sink.emit(Event::RawTransfer {
            index: self.reserve,
            from: from.clone(),
            to: to.clone(),
            raw_amount,
            accumulator,
            face_amount,
        });
    }
}
