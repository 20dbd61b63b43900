//! Administrative configuration held by a `Market` instance: the owner
//! principal and the treasury address. Grounded on the shape of the
//! teacher's `controller/src/config.rs` (owner/treasury-style storage
//! singletons), generalized from on-chain storage mappers to plain struct
//! fields since this port has no chain runtime to persist them in.

use market_errors::EngineError;
use market_structs::UserId;

#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Principal allowed to call the admin surface (`add_reserve`,
    /// `set_treasury`, `set_*_factor`, `pause`/`unpause`).
    pub owner: UserId,
    /// Receives the reserve-factor share of accrued interest as minted
    /// z-tokens (spec.md §4.4 step 5).
    pub treasury: UserId,
    /// The identity `AssetLedger` knows this `Market` instance by — the
    /// address whose balance backs every reserve's outstanding liquidity.
    pub self_id: UserId,
}

impl MarketConfig {
    pub fn new(owner: UserId, treasury: UserId, self_id: UserId) -> Self {
        Self {
            owner,
            treasury,
            self_id,
        }
    }

    pub fn require_owner(&self, caller: &UserId) -> Result<(), EngineError> {
        if caller == &self.owner {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }
}
