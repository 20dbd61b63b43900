//! The nine user-facing operations (spec.md §4.6) plus the z-token transfer
//! surface layered over `ZTokenState` (spec.md §4.3, mediated through
//! `Market` since it alone holds `&mut ZTokenState` — see the module doc on
//! `z_token::ZTokenState`).
//!
//! Every operation here follows the same shape: a thin public wrapper
//! snapshots whatever reserve/z-token/debt state it is about to touch, calls
//! a private `try_*` that does the real work, and restores the snapshot if
//! `try_*` returns an error. This is `Market`'s stand-in for the reference
//! engine's whole-transaction revert (spec.md §7 "atomicity"): nothing here
//! has an external transaction log to roll back against, so each operation
//! rolls its own in-process state back by hand instead. The one genuinely
//! irreversible step in every `try_*` — the `AssetLedger` call that moves
//! base assets — is always ordered last, after every check that can fail has
//! already passed, so a rollback never needs to undo an external transfer.
//!
//! Grounded on the teacher's `lending_pool::endpoints` module for operation
//! shape and ordering, and `flash_mock`/`flash_loan` for the flash-loan
//! guard/callback/balance-check sequence.

use asset_ledger::AssetLedger;
use flash_loan::FlashLoanReceiver;
use market_errors::EngineError;
use market_events::{Event, EventSink};
use market_math::{FixedMath, SafeMath};
use market_structs::{ReserveIndex, TokenId, UserId};
use price_oracle::PriceSource;
use primitive_types::U256;

use crate::solvency::{seize_amount, ConstAccumulator};
use crate::Market;

impl Market {
    // ---------------------------------------------------------------- deposit

    pub fn deposit(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let index = self.resolve_index(token)?;
        self.require_not_paused(index)?;
        let reserve_before = self.reserve(index)?.clone();
        let z_before = self.z_tokens_clone(index);

        let outcome = self.try_deposit(caller, token, index, face_amount, now, ledger, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_z_token(index, z_before);
        }
        outcome
    }

    fn try_deposit(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        let minted_shares = self.z_token_mut(index).mint(caller, face_amount, &ConstAccumulator(accumulator))?;
        let projected_balance = SafeMath::add(ledger.balance_of(&self.config.self_id, token), face_amount)?;
        self.apply_rates(index, projected_balance)?;
        ledger.transfer_from(caller, &self.config.self_id, token, face_amount)?;

        sink.emit(Event::Deposit {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            minted_shares,
        });
        tracing::info!(user = %caller, token = %token, amount = %face_amount, "deposit");
        Ok(())
    }

    // --------------------------------------------------------------- withdraw

    pub fn withdraw(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let index = self.resolve_index(token)?;
        let reserve_before = self.reserve(index)?.clone();
        let z_before = self.z_tokens_clone(index);

        let outcome = self.try_withdraw(caller, token, index, face_amount, now, ledger, oracle, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_z_token(index, z_before);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn try_withdraw(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        let burned_shares = self.z_token_mut(index).burn(caller, face_amount, &ConstAccumulator(accumulator))?;
        self.touch_reserve(index, now, ledger, sink)?;
        self.assert_solvent(caller, oracle, now)?;
        ledger.transfer(&self.config.self_id, caller, token, face_amount)?;

        sink.emit(Event::Withdraw {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            burned_shares,
        });
        tracing::info!(user = %caller, token = %token, amount = %face_amount, "withdraw");
        Ok(())
    }

    /// Withdraws `caller`'s entire z-token balance for `token`.
    pub fn withdraw_all(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        let index = self.resolve_index(token)?;
        let reserve_before = self.reserve(index)?.clone();
        let z_before = self.z_tokens_clone(index);

        let outcome = self.try_withdraw_all(caller, token, index, now, ledger, oracle, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_z_token(index, z_before);
        }
        outcome
    }

    fn try_withdraw_all(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        let face_amount = self.z_token_mut(index).burn_all(caller, &ConstAccumulator(accumulator))?;
        if face_amount.is_zero() {
            return Ok(U256::zero());
        }
        self.touch_reserve(index, now, ledger, sink)?;
        self.assert_solvent(caller, oracle, now)?;
        ledger.transfer(&self.config.self_id, caller, token, face_amount)?;

        sink.emit(Event::Withdraw {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            burned_shares: U256::zero(),
        });
        Ok(face_amount)
    }

    // ------------------------------------------------------------ collateral

    pub fn enable_collateral(&mut self, caller: &UserId, token: &TokenId, sink: &dyn EventSink) -> Result<(), EngineError> {
        let index = self.resolve_index(token)?;
        let mut mask = self.collateral_mask(caller);
        mask.set(index);
        self.set_collateral_mask(caller, mask);
        sink.emit(Event::CollateralEnabled {
            user: caller.clone(),
            token: token.clone(),
            index,
        });
        Ok(())
    }

    pub fn disable_collateral(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        oracle: &dyn PriceSource,
        now: u64,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let index = self.resolve_index(token)?;
        let face_balance = self.face_z_balance(caller, index)?;
        self.assert_solvent_after_decrease(caller, index, face_balance, oracle, now)?;

        let mut mask = self.collateral_mask(caller);
        mask.clear(index);
        self.set_collateral_mask(caller, mask);
        sink.emit(Event::CollateralDisabled {
            user: caller.clone(),
            token: token.clone(),
            index,
        });
        Ok(())
    }

    // ---------------------------------------------------------------- borrow

    pub fn borrow(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let index = self.resolve_index(token)?;
        self.require_not_paused(index)?;
        let reserve_before = self.reserve(index)?.clone();
        let debt_before = self.user_debt_raw(caller, index);

        let outcome = self.try_borrow(caller, token, index, face_amount, now, ledger, oracle, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_user_debt(caller, index, debt_before);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn try_borrow(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let debt_accumulator = self.reserve(index)?.debt_accumulator;
        let raw_debt_delta = FixedMath::div_fp_ceil(face_amount, debt_accumulator)?;

        let mut debt = self.user_debt(caller, index);
        debt.raw_amount = SafeMath::add(debt.raw_amount, raw_debt_delta)?;
        self.set_user_debt(caller, index, debt);
        {
            let reserve = self.reserve_mut(index)?;
            reserve.raw_total_debt = SafeMath::add(reserve.raw_total_debt, raw_debt_delta)?;
        }

        self.touch_reserve(index, now, ledger, sink)?;
        self.assert_solvent(caller, oracle, now)?;
        ledger.transfer(&self.config.self_id, caller, token, face_amount)?;

        sink.emit(Event::Borrow {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            raw_debt_delta,
        });
        tracing::info!(user = %caller, token = %token, amount = %face_amount, "borrow");
        Ok(())
    }

    // ----------------------------------------------------------------- repay

    pub fn repay(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let index = self.resolve_index(token)?;
        let reserve_before = self.reserve(index)?.clone();
        let debt_before = self.user_debt_raw(caller, index);

        let outcome = self.try_repay(caller, token, index, face_amount, now, ledger, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_user_debt(caller, index, debt_before);
        }
        outcome
    }

    fn try_repay(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        face_amount: U256,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let debt_accumulator = self.reserve(index)?.debt_accumulator;
        let raw_debt_delta = FixedMath::div_fp(face_amount, debt_accumulator)?;

        let mut debt = self.user_debt(caller, index);
        debt.raw_amount = SafeMath::sub(debt.raw_amount, raw_debt_delta)?;
        self.set_user_debt(caller, index, debt);
        {
            let reserve = self.reserve_mut(index)?;
            reserve.raw_total_debt = SafeMath::sub(reserve.raw_total_debt, raw_debt_delta)?;
        }
        let projected_balance = SafeMath::add(ledger.balance_of(&self.config.self_id, token), face_amount)?;
        self.apply_rates(index, projected_balance)?;
        ledger.transfer_from(caller, &self.config.self_id, token, face_amount)?;

        sink.emit(Event::Repay {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            raw_debt_delta,
        });
        tracing::info!(user = %caller, token = %token, amount = %face_amount, "repay");
        Ok(())
    }

    /// Repays `caller`'s entire outstanding debt for `token`, zeroing the raw
    /// balance exactly rather than recomputing it from a face-value
    /// round-trip (which could leave a dust residual).
    pub fn repay_all(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        let index = self.resolve_index(token)?;
        let reserve_before = self.reserve(index)?.clone();
        let debt_before = self.user_debt_raw(caller, index);

        let outcome = self.try_repay_all(caller, token, index, now, ledger, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
            self.restore_user_debt(caller, index, debt_before);
        }
        outcome
    }

    fn try_repay_all(
        &mut self,
        caller: &UserId,
        token: &TokenId,
        index: ReserveIndex,
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        let debt = self.user_debt(caller, index);
        if debt.is_empty() {
            return Ok(U256::zero());
        }
        let debt_accumulator = self.reserve(index)?.debt_accumulator;
        let face_amount = FixedMath::mul_fp(debt.raw_amount, debt_accumulator)?;

        self.clear_user_debt(caller, index);
        {
            let reserve = self.reserve_mut(index)?;
            reserve.raw_total_debt = SafeMath::sub(reserve.raw_total_debt, debt.raw_amount)?;
        }
        let projected_balance = SafeMath::add(ledger.balance_of(&self.config.self_id, token), face_amount)?;
        self.apply_rates(index, projected_balance)?;
        ledger.transfer_from(caller, &self.config.self_id, token, face_amount)?;

        sink.emit(Event::Repay {
            user: caller.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            raw_debt_delta: debt.raw_amount,
        });
        Ok(face_amount)
    }

    // ------------------------------------------------------------- liquidate

    #[allow(clippy::too_many_arguments)]
    pub fn liquidate(
        &mut self,
        liquidator: &UserId,
        borrower: &UserId,
        debt_token: &TokenId,
        face_amount: U256,
        collateral_token: &TokenId,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let debt_index = self.resolve_index(debt_token)?;
        let collateral_index = self.resolve_index(collateral_token)?;
        let debt_reserve_before = self.reserve(debt_index)?.clone();
        let collateral_reserve_before = self.reserve(collateral_index)?.clone();
        let z_collateral_before = self.z_tokens_clone(collateral_index);
        let debt_before = self.user_debt_raw(borrower, debt_index);

        let outcome = self.try_liquidate(
            liquidator,
            borrower,
            debt_token,
            debt_index,
            face_amount,
            collateral_token,
            collateral_index,
            now,
            ledger,
            oracle,
            sink,
        );
        if outcome.is_err() {
            self.restore_reserve(debt_index, debt_reserve_before);
            self.restore_reserve(collateral_index, collateral_reserve_before);
            self.restore_z_token(collateral_index, z_collateral_before);
            self.restore_user_debt(borrower, debt_index, debt_before);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn try_liquidate(
        &mut self,
        liquidator: &UserId,
        borrower: &UserId,
        debt_token: &TokenId,
        debt_index: ReserveIndex,
        face_amount: U256,
        collateral_token: &TokenId,
        collateral_index: ReserveIndex,
        now: u64,
        ledger: &dyn AssetLedger,
        oracle: &dyn PriceSource,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(debt_index, now, ledger, sink)?;
        if collateral_index != debt_index {
            self.touch_reserve(collateral_index, now, ledger, sink)?;
        }

        if self.is_solvent(borrower, oracle, now)? {
            return Err(EngineError::InvalidLiquidation);
        }

        // Reduce the borrower's debt, exactly like `repay`.
        let debt_accumulator = self.reserve(debt_index)?.debt_accumulator;
        let raw_debt_delta = FixedMath::div_fp(face_amount, debt_accumulator)?;
        let mut debt = self.user_debt(borrower, debt_index);
        debt.raw_amount = SafeMath::sub(debt.raw_amount, raw_debt_delta)?;
        self.set_user_debt(borrower, debt_index, debt);
        {
            let reserve = self.reserve_mut(debt_index)?;
            reserve.raw_total_debt = SafeMath::sub(reserve.raw_total_debt, raw_debt_delta)?;
        }
        ledger.transfer_from(liquidator, &self.config.self_id, debt_token, face_amount)?;

        // Seize the collateral-equivalent z-tokens: no liquidation bonus
        // (spec.md §9 Open Question resolution).
        let debt_price = oracle.price(debt_token, now)?;
        let collateral_price = oracle.price(collateral_token, now)?;
        let debt_decimals = self.reserve(debt_index)?.decimals;
        let collateral_decimals = self.reserve(collateral_index)?.decimals;
        let seized_face = seize_amount(face_amount, debt_price, debt_decimals, collateral_price, collateral_decimals)?;

        let collateral_accumulator = self.reserve(collateral_index)?.lending_accumulator;
        self.z_token_mut(collateral_index).transfer(
            borrower,
            liquidator,
            seized_face,
            &ConstAccumulator(collateral_accumulator),
            sink,
        )?;

        self.touch_reserve(debt_index, now, ledger, sink)?;
        if collateral_index != debt_index {
            self.touch_reserve(collateral_index, now, ledger, sink)?;
        }

        // The liquidation must not leave the borrower over-corrected past
        // solvency (spec.md §4.6).
        if self.collateral_value(borrower, oracle, now)? > self.required_value(borrower, oracle, now)? {
            return Err(EngineError::InvalidLiquidation);
        }

        sink.emit(Event::Liquidate {
            liquidator: liquidator.clone(),
            borrower: borrower.clone(),
            debt_token: debt_token.clone(),
            collateral_token: collateral_token.clone(),
            repaid_amount: face_amount,
            seized_shares: seized_face,
        });
        tracing::info!(
            liquidator = %liquidator, borrower = %borrower, debt_token = %debt_token,
            collateral_token = %collateral_token, repaid = %face_amount, seized = %seized_face,
            "liquidate"
        );
        Ok(())
    }

    // ------------------------------------------------------------ flash_loan

    #[allow(clippy::too_many_arguments)]
    pub fn flash_loan(
        &mut self,
        token: &TokenId,
        face_amount: U256,
        receiver: &dyn FlashLoanReceiver,
        receiver_id: &UserId,
        calldata: &[u8],
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        if face_amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }
        let index = self.resolve_index(token)?;
        self.require_not_paused(index)?;
        if self.reserve(index)?.flash_loan_guard {
            return Err(EngineError::Reentrancy(token.0.clone()));
        }
        let reserve_before = self.reserve(index)?.clone();

        let outcome = self.try_flash_loan(token, index, face_amount, receiver, receiver_id, calldata, now, ledger, sink);
        if outcome.is_err() {
            self.restore_reserve(index, reserve_before);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn try_flash_loan(
        &mut self,
        token: &TokenId,
        index: ReserveIndex,
        face_amount: U256,
        receiver: &dyn FlashLoanReceiver,
        receiver_id: &UserId,
        calldata: &[u8],
        now: u64,
        ledger: &dyn AssetLedger,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.touch_reserve(index, now, ledger, sink)?;
        self.reserve_mut(index)?.flash_loan_guard = true;

        let pre_balance = ledger.balance_of(&self.config.self_id, token);
        let fee = FixedMath::mul_fp(face_amount, self.reserve(index)?.flash_loan_fee)?;

        ledger.transfer(&self.config.self_id, receiver_id, token, face_amount)?;
        receiver.on_flash_loan(ledger, &self.config.self_id, token, face_amount, fee, calldata)?;

        let post_balance = ledger.balance_of(&self.config.self_id, token);
        let required = SafeMath::add(pre_balance, fee)?;
        if post_balance < required {
            return Err(EngineError::InsufficientRepaid {
                expected: required.to_string(),
                actual: post_balance.to_string(),
            });
        }

        self.reserve_mut(index)?.flash_loan_guard = false;
        self.touch_reserve(index, now, ledger, sink)?;

        sink.emit(Event::FlashLoan {
            receiver: receiver_id.clone(),
            token: token.clone(),
            index,
            amount: face_amount,
            fee,
        });
        tracing::info!(receiver = %receiver_id, token = %token, amount = %face_amount, fee = %fee, "flash_loan");
        Ok(())
    }

    // ------------------------------------------------------------- z-tokens

    pub fn transfer_shares(
        &mut self,
        from: &UserId,
        to: &UserId,
        token: &TokenId,
        face_amount: U256,
        oracle: &dyn PriceSource,
        now: u64,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let index = self.resolve_index(token)?;
        self.assert_solvent_after_decrease(from, index, face_amount, oracle, now)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        self.z_token_mut(index).transfer(from, to, face_amount, &ConstAccumulator(accumulator), sink)
    }

    pub fn transfer_shares_all(
        &mut self,
        from: &UserId,
        to: &UserId,
        token: &TokenId,
        oracle: &dyn PriceSource,
        now: u64,
        sink: &dyn EventSink,
    ) -> Result<U256, EngineError> {
        let index = self.resolve_index(token)?;
        let face_balance = self.face_z_balance(from, index)?;
        self.assert_solvent_after_decrease(from, index, face_balance, oracle, now)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        self.z_token_mut(index).transfer_all(from, to, &ConstAccumulator(accumulator), sink)
    }

    pub fn approve_shares(&mut self, owner: &UserId, spender: &UserId, token: &TokenId, face_amount: U256, sink: &dyn EventSink) -> Result<(), EngineError> {
        let index = self.resolve_index(token)?;
        self.z_token_mut(index).approve(owner, spender, face_amount, sink);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transfer_shares_from(
        &mut self,
        spender: &UserId,
        owner: &UserId,
        to: &UserId,
        token: &TokenId,
        face_amount: U256,
        oracle: &dyn PriceSource,
        now: u64,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        let index = self.resolve_index(token)?;
        self.assert_solvent_after_decrease(owner, index, face_amount, oracle, now)?;
        let accumulator = self.reserve(index)?.lending_accumulator;
        self.z_token_mut(index)
            .transfer_from(spender, owner, to, face_amount, &ConstAccumulator(accumulator), sink)
    }
}
