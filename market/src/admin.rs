//! Owner-gated administrative surface: reserve listing and per-reserve
//! parameter/pause control. Grounded on the teacher's
//! `controller::admin` module, which gates the same set of knobs behind an
//! on-chain owner check; here `MarketConfig::require_owner` plays that role.

use market_constants::scale;
use market_errors::EngineError;
use market_events::{Event, EventSink};
use market_rates::IrmParams;
use market_structs::{Reserve, TokenId, UserId};
use primitive_types::U256;
use z_token::ZTokenState;

use crate::Market;

impl Market {
    /// Registers a new reserve for `token`. Reserve indices are assigned
    /// densely starting at `0`, in registration order.
    #[allow(clippy::too_many_arguments)]
    pub fn add_reserve(
        &mut self,
        caller: &UserId,
        token: TokenId,
        decimals: u32,
        collateral_factor: U256,
        borrow_factor: U256,
        reserve_factor: U256,
        flash_loan_fee: U256,
        irm: IrmParams,
        now: u64,
        sink: &dyn EventSink,
    ) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        if self.token_index.contains_key(&token) {
            return Err(EngineError::DuplicateReserve(token.0));
        }
        let index = self.reserves.len() as market_structs::ReserveIndex;
        let reserve = Reserve::new(
            token.clone(),
            index,
            decimals,
            collateral_factor,
            borrow_factor,
            reserve_factor,
            flash_loan_fee,
            irm,
            now,
        )?;
        self.token_index.insert(token.clone(), index);
        self.reserves.push(reserve);
        self.z_tokens.push(ZTokenState::new(index));

        sink.emit(Event::ReserveCreated { token, index });
        tracing::info!(index, decimals, "reserve registered");
        Ok(())
    }

    pub fn set_treasury(&mut self, caller: &UserId, treasury: UserId) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        self.config.treasury = treasury;
        Ok(())
    }

    pub fn set_collateral_factor(&mut self, caller: &UserId, token: &TokenId, collateral_factor: U256, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        if collateral_factor > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.collateral_factor = collateral_factor;
        sink.emit(Event::ReserveParamsUpdated { token: token.clone(), index });
        Ok(())
    }

    pub fn set_borrow_factor(&mut self, caller: &UserId, token: &TokenId, borrow_factor: U256, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        if borrow_factor > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.borrow_factor = borrow_factor;
        sink.emit(Event::ReserveParamsUpdated { token: token.clone(), index });
        Ok(())
    }

    pub fn set_reserve_factor(&mut self, caller: &UserId, token: &TokenId, reserve_factor: U256, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        if reserve_factor > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.reserve_factor = reserve_factor;
        sink.emit(Event::ReserveParamsUpdated { token: token.clone(), index });
        Ok(())
    }

    pub fn set_flash_loan_fee(&mut self, caller: &UserId, token: &TokenId, flash_loan_fee: U256, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        if flash_loan_fee > scale() {
            return Err(EngineError::SafeCastOutOfRange);
        }
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.flash_loan_fee = flash_loan_fee;
        sink.emit(Event::ReserveParamsUpdated { token: token.clone(), index });
        Ok(())
    }

    pub fn set_interest_rate_model(&mut self, caller: &UserId, token: &TokenId, irm: IrmParams, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.irm = irm;
        sink.emit(Event::ReserveParamsUpdated { token: token.clone(), index });
        Ok(())
    }

    pub fn pause(&mut self, caller: &UserId, token: &TokenId, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.paused = true;
        sink.emit(Event::ReservePaused { token: token.clone(), index });
        tracing::warn!(index, "reserve paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: &UserId, token: &TokenId, sink: &dyn EventSink) -> Result<(), EngineError> {
        self.config.require_owner(caller)?;
        let index = self.resolve_index(token)?;
        self.reserve_mut(index)?.paused = false;
        sink.emit(Event::ReserveUnpaused { token: token.clone(), index });
        Ok(())
    }
}
