//! The central accounting engine: reserve/user storage, accumulator
//! synchronization, solvency arithmetic, and the nine user-facing operations
//! (deposit/withdraw/borrow/repay/liquidate/flash_loan plus the z-token
//! transfer surface) that mutate it.
//!
//! Grounded on the teacher's `lending_pool` contract, which plays the same
//! "one struct owns every reserve and every position" role; `Market` collapses
//! the teacher's separate `controller`/`lending_pool`/`liquidity_pool`
//! contracts into a single in-process engine since there is no cross-contract
//! call boundary to preserve off-chain (`SPEC_FULL.md` §3).
//!
//! `Market` is deliberately free of type parameters: every external
//! collaborator — the base-asset ledger, the price feed, the event sink — is
//! taken as a trait object parameter on the operation that needs it, rather
//! than stored as a generic field. See `solvency.rs` for why z-token
//! mint/burn/transfer calls from here always pass a throwaway
//! [`solvency::ConstAccumulator`] instead of threading a live `&Market`
//! through a trait object.

pub mod admin;
pub mod config;
pub mod ops;
pub mod solvency;
pub mod sync;

pub use config::MarketConfig;

use market_errors::EngineError;
use market_structs::{CollateralMask, Reserve, ReserveIndex, TokenId, UserDebt, UserId};
use std::collections::HashMap;
use z_token::ZTokenState;

/// The engine. One instance per deployed market; reserves are added via
/// [`admin::Market::add_reserve`] and indexed densely from `0`.
pub struct Market {
    pub config: MarketConfig,
    reserves: Vec<Reserve>,
    token_index: HashMap<TokenId, ReserveIndex>,
    z_tokens: Vec<ZTokenState>,
    user_debts: HashMap<(UserId, ReserveIndex), UserDebt>,
    collateral_masks: HashMap<UserId, CollateralMask>,
}

impl Market {
    pub fn new(config: MarketConfig) -> Self {
        Self {
            config,
            reserves: Vec::new(),
            token_index: HashMap::new(),
            z_tokens: Vec::new(),
            user_debts: HashMap::new(),
            collateral_masks: HashMap::new(),
        }
    }

    pub fn reserve_count(&self) -> usize {
        self.reserves.len()
    }

    pub fn reserve(&self, index: ReserveIndex) -> Result<&Reserve, EngineError> {
        self.reserves
            .get(index as usize)
            .ok_or_else(|| EngineError::UnknownReserve(index.to_string()))
    }

    fn reserve_mut(&mut self, index: ReserveIndex) -> Result<&mut Reserve, EngineError> {
        self.reserves
            .get_mut(index as usize)
            .ok_or_else(|| EngineError::UnknownReserve(index.to_string()))
    }

    pub fn resolve_index(&self, token: &TokenId) -> Result<ReserveIndex, EngineError> {
        self.token_index
            .get(token)
            .copied()
            .ok_or_else(|| EngineError::UnknownReserve(token.0.clone()))
    }

    pub fn collateral_mask(&self, user: &UserId) -> CollateralMask {
        self.collateral_masks.get(user).copied().unwrap_or_default()
    }

    pub fn user_debt(&self, user: &UserId, index: ReserveIndex) -> UserDebt {
        self.user_debts
            .get(&(user.clone(), index))
            .copied()
            .unwrap_or_default()
    }

    /// `floor(raw_debt * debt_accumulator / SCALE)`.
    pub fn face_debt(&self, user: &UserId, index: ReserveIndex) -> Result<primitive_types::U256, EngineError> {
        let debt = self.user_debt(user, index);
        market_math::FixedMath::mul_fp(debt.raw_amount, self.reserve(index)?.debt_accumulator)
    }

    /// `floor(raw_z_balance * lending_accumulator / SCALE)`.
    pub fn face_z_balance(&self, user: &UserId, index: ReserveIndex) -> Result<primitive_types::U256, EngineError> {
        let accumulator = self.reserve(index)?.lending_accumulator;
        self.z_tokens[index as usize].balance_of(user, &solvency::ConstAccumulator(accumulator))
    }

    pub fn raw_z_total_supply(&self, index: ReserveIndex) -> Result<primitive_types::U256, EngineError> {
        Ok(self.z_tokens[index as usize].raw_total_supply())
    }

    fn require_not_paused(&self, index: ReserveIndex) -> Result<(), EngineError> {
        let reserve = self.reserve(index)?;
        if reserve.paused {
            return Err(EngineError::Paused(reserve.token.0.clone()));
        }
        Ok(())
    }

    // ---- storage helpers used by ops.rs's snapshot/restore rollback pattern

    fn z_tokens_clone(&self, index: ReserveIndex) -> ZTokenState {
        self.z_tokens[index as usize].clone()
    }

    fn z_token_mut(&mut self, index: ReserveIndex) -> &mut ZTokenState {
        &mut self.z_tokens[index as usize]
    }

    fn restore_reserve(&mut self, index: ReserveIndex, reserve: Reserve) {
        self.reserves[index as usize] = reserve;
    }

    fn restore_z_token(&mut self, index: ReserveIndex, z_token: ZTokenState) {
        self.z_tokens[index as usize] = z_token;
    }

    fn set_collateral_mask(&mut self, user: &UserId, mask: CollateralMask) {
        self.collateral_masks.insert(user.clone(), mask);
    }

    fn user_debt_raw(&self, user: &UserId, index: ReserveIndex) -> Option<UserDebt> {
        self.user_debts.get(&(user.clone(), index)).copied()
    }

    fn restore_user_debt(&mut self, user: &UserId, index: ReserveIndex, debt: Option<UserDebt>) {
        let key = (user.clone(), index);
        match debt {
            Some(debt) => {
                self.user_debts.insert(key, debt);
            }
            None => {
                self.user_debts.remove(&key);
            }
        }
    }

    fn set_user_debt(&mut self, user: &UserId, index: ReserveIndex, debt: UserDebt) {
        let key = (user.clone(), index);
        if debt.is_empty() {
            self.user_debts.remove(&key);
        } else {
            self.user_debts.insert(key, debt);
        }
    }

    fn clear_user_debt(&mut self, user: &UserId, index: ReserveIndex) {
        self.user_debts.remove(&(user.clone(), index));
    }
}
