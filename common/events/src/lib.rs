//! Domain events emitted by `Market` operations.
//!
//! The teacher emits these as indexed on-chain log topics (`#[event(...)]`
//! functions in a `multiversx_sc` module). Off-chain there is no log to
//! index into, so the same event catalogue becomes a plain `Event` enum
//! plus an [`EventSink`] trait a caller implements to receive them —
//! `tracing` spans (emitted directly by `lending_market`) cover the
//! human-readable side, this covers the structured side.

use market_structs::{ReserveIndex, TokenId, UserId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReserveCreated {
        token: TokenId,
        index: ReserveIndex,
    },
    ReserveParamsUpdated {
        token: TokenId,
        index: ReserveIndex,
    },
    ReservePaused {
        token: TokenId,
        index: ReserveIndex,
    },
    ReserveUnpaused {
        token: TokenId,
        index: ReserveIndex,
    },
    /// Emitted once per reserve touched by any operation, before the
    /// operation's own event — records the accumulator/rate snapshot interest
    /// accrual just produced.
    InterestAccrued {
        token: TokenId,
        index: ReserveIndex,
        lending_accumulator: U256,
        debt_accumulator: U256,
        borrow_rate: U256,
        lending_rate: U256,
    },
    Deposit {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
        amount: U256,
        minted_shares: U256,
    },
    Withdraw {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
        amount: U256,
        burned_shares: U256,
    },
    CollateralEnabled {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
    },
    CollateralDisabled {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
    },
    Borrow {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
        amount: U256,
        raw_debt_delta: U256,
    },
    Repay {
        user: UserId,
        token: TokenId,
        index: ReserveIndex,
        amount: U256,
        raw_debt_delta: U256,
    },
    Liquidate {
        liquidator: UserId,
        borrower: UserId,
        debt_token: TokenId,
        collateral_token: TokenId,
        repaid_amount: U256,
        seized_shares: U256,
    },
    FlashLoan {
        receiver: UserId,
        token: TokenId,
        index: ReserveIndex,
        amount: U256,
        fee: U256,
    },
    /// z-token face-value transfer between two holders of the same reserve.
    /// Always accompanied by a [`Event::RawTransfer`] carrying the raw-unit
    /// breakdown; mint/burn (deposit/withdraw) do not emit this — those are
    /// covered by `Deposit`/`Withdraw` above.
    Transfer {
        index: ReserveIndex,
        from: UserId,
        to: UserId,
        face_amount: U256,
    },
    RawTransfer {
        index: ReserveIndex,
        from: UserId,
        to: UserId,
        raw_amount: U256,
        accumulator: U256,
        face_amount: U256,
    },
    Approval {
        index: ReserveIndex,
        owner: UserId,
        spender: UserId,
        face_amount: U256,
    },
}

/// Receives domain events as `Market` operations complete. Implement this to
/// forward events into an indexer, message bus, or audit log; a no-op
/// implementation is provided for callers that only want `tracing` output.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Discards every event. Useful in tests and for callers that rely solely on
/// `tracing` spans for observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        events: RefCell<Vec<Event>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: Event) {
            self.events.borrow_mut().push(event);
        }
    }

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullEventSink;
        sink.emit(Event::ReserveCreated {
            token: TokenId::new("A"),
            index: 0,
        });
    }

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingSink::default();
        sink.emit(Event::ReserveCreated {
            token: TokenId::new("A"),
            index: 0,
        });
        sink.emit(Event::ReserveCreated {
            token: TokenId::new("B"),
            index: 1,
        });
        assert_eq!(sink.events.borrow().len(), 2);
    }
}
