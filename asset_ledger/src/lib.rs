//! The fungible-token ledger `Market` moves base assets through.
//!
//! This is deliberately thin: the engine never implements token transfer
//! semantics itself, it only consumes an [`AssetLedger`]. An
//! [`InMemoryAssetLedger`] reference implementation is provided for tests
//! and for standalone (non-custodial-chain) deployments.

use market_errors::EngineError;
use market_structs::{TokenId, UserId};
use primitive_types::U256;
use std::cell::RefCell;
use std::collections::HashMap;

/// The underlying fungible-token ledger, external to this engine.
/// Implementations debit/credit base-asset balances between holder
/// addresses; `Market` treats every call as fallible and fatal to the
/// enclosing operation on failure (spec.md §6).
pub trait AssetLedger {
    fn transfer(&self, from: &UserId, to: &UserId, token: &TokenId, face_amt: U256) -> Result<(), EngineError>;

    /// Requires a prior `approve` on the ledger side; out of scope here.
    fn transfer_from(
        &self,
        owner: &UserId,
        to: &UserId,
        token: &TokenId,
        face_amt: U256,
    ) -> Result<(), EngineError>;

    fn balance_of(&self, addr: &UserId, token: &TokenId) -> U256;
}

/// Reference [`AssetLedger`]: plain balance table, no allowance enforcement
/// (callers in this crate's tests always transfer on behalf of the holder).
/// Grounded on the teacher's `liquidity_layer` balance bookkeeping, reduced
/// to a single in-memory table since there is no underlying chain here.
#[derive(Debug, Default)]
pub struct InMemoryAssetLedger {
    balances: RefCell<HashMap<(UserId, TokenId), U256>>,
}

impl InMemoryAssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: credits `addr` with `amount` of `token`
    /// without debiting anyone.
    pub fn mint(&self, addr: &UserId, token: &TokenId, amount: U256) {
        let mut balances = self.balances.borrow_mut();
        let entry = balances.entry((addr.clone(), token.clone())).or_insert(U256::zero());
        *entry += amount;
    }
}

impl AssetLedger for InMemoryAssetLedger {
    fn transfer(&self, from: &UserId, to: &UserId, token: &TokenId, face_amt: U256) -> Result<(), EngineError> {
        if face_amt.is_zero() {
            return Ok(());
        }
        let mut balances = self.balances.borrow_mut();
        let from_key = (from.clone(), token.clone());
        let from_balance = *balances.get(&from_key).unwrap_or(&U256::zero());
        if from_balance < face_amt {
            return Err(EngineError::AssetLedger(format!(
                "{from} has insufficient balance of {token} to transfer {face_amt}"
            )));
        }
        balances.insert(from_key, from_balance - face_amt);
        let to_key = (to.clone(), token.clone());
        let to_balance = *balances.get(&to_key).unwrap_or(&U256::zero());
        balances.insert(to_key, to_balance + face_amt);
        Ok(())
    }

    fn transfer_from(
        &self,
        owner: &UserId,
        to: &UserId,
        token: &TokenId,
        face_amt: U256,
    ) -> Result<(), EngineError> {
        self.transfer(owner, to, token, face_amt)
    }

    fn balance_of(&self, addr: &UserId, token: &TokenId) -> U256 {
        *self
            .balances
            .borrow()
            .get(&(addr.clone(), token.clone()))
            .unwrap_or(&U256::zero())
    }
}
