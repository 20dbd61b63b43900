//! The flash-loan callback contract `Market::flash_loan` invokes, plus a
//! reference mock receiver exercising the three repayment behaviors the
//! teacher's `flash_mock` contract exposes (`flash`, `flashRepaySome`,
//! `flashNoRepay`): full repayment with fee, a short repayment, and no
//! repayment at all — used by `market`'s test suite to exercise
//! `InsufficientRepaid`.

use asset_ledger::AssetLedger;
use market_errors::EngineError;
use market_structs::{TokenId, UserId};
use primitive_types::U256;

/// External collaborator a borrower supplies to `Market::flash_loan`. Must
/// return the borrowed amount plus fee to `market` via `ledger` before
/// returning; `Market` checks the post-balance itself and does not trust the
/// callback's return value alone (spec.md §4.6/§6).
pub trait FlashLoanReceiver {
    fn on_flash_loan(
        &self,
        ledger: &dyn AssetLedger,
        market: &UserId,
        token: &TokenId,
        amount: U256,
        fee: U256,
        calldata: &[u8],
    ) -> Result<(), EngineError>;
}

/// How much of `amount + fee` [`MockFlashLoanReceiver`] repays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayBehavior {
    /// Repays `amount + fee` in full — grounded on `flash_mock::flash`.
    Full,
    /// Repays `amount + fee` minus `shortfall` — grounded on
    /// `flash_mock::flash_repay_some`.
    Short(U256),
    /// Repays nothing — grounded on `flash_mock::flash_no_repay`.
    None,
}

/// Reference [`FlashLoanReceiver`] for tests: a fixed identity the mock
/// transfers funds from/to, with a configurable repayment shortfall.
pub struct MockFlashLoanReceiver {
    pub id: UserId,
    pub behavior: RepayBehavior,
}

impl MockFlashLoanReceiver {
    pub fn new(id: UserId, behavior: RepayBehavior) -> Self {
        Self { id, behavior }
    }
}

impl FlashLoanReceiver for MockFlashLoanReceiver {
    fn on_flash_loan(
        &self,
        ledger: &dyn AssetLedger,
        market: &UserId,
        token: &TokenId,
        amount: U256,
        fee: U256,
        _calldata: &[u8],
    ) -> Result<(), EngineError> {
        let owed = amount.saturating_add(fee);
        let repay = match self.behavior {
            RepayBehavior::Full => owed,
            RepayBehavior::Short(shortfall) => owed.saturating_sub(shortfall),
            RepayBehavior::None => U256::zero(),
        };
        if repay.is_zero() {
            return Ok(());
        }
        ledger.transfer(&self.id, market, token, repay)
    }
}
