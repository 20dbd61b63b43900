//! End-to-end scenarios exercising the full `Market` surface: the
//! deposit/borrow solvency boundary and the liquidation over-correction
//! boundary (spec.md §8 scenarios 1 and 4), flash loans, pausing, and
//! collateral-disable protection.
//!
//! The borrow-boundary and liquidation-boundary numbers here reproduce
//! spec.md §8's stated pass/fail boundaries exactly (22.5 B borrow succeeds,
//! 22.6 B fails; 8.1 B liquidation succeeds, 8.2 B fails) under the corrected
//! `required_value` formula documented in `solvency.rs` and `DESIGN.md`. The
//! scenario's own literal `current_borrowing_rate`/`current_lending_rate`
//! figures are not asserted here — `common/rates`'s test suite documents why
//! they don't reproduce under the stated interest-rate-model parameters.
//!
//! Scenarios 2 and 3 (the Δ=100 accrual vectors with and without a nonzero
//! reserve factor) are not here: pinning their literal deltas means seeding a
//! reserve's rate fields directly rather than driving them through
//! `deposit`/`borrow`, which needs access this crate's public API doesn't
//! expose. See `lending_market::sync`'s unit tests
//! (`interest_accrual_literal_vectors_at_delta_100_no_reserve_factor`,
//! `reserve_factor_mints_treasury_interest_and_pins_post_repay_residual`).

use asset_ledger::{AssetLedger, InMemoryAssetLedger};
use flash_loan::{MockFlashLoanReceiver, RepayBehavior};
use lending_market::config::MarketConfig;
use lending_market::Market;
use market_constants::{scale, u256_pow10, SECONDS_PER_YEAR};
use market_errors::EngineError;
use market_events::NullEventSink;
use market_math::FixedMath;
use market_rates::IrmParams;
use market_structs::{TokenId, UserId};
use price_oracle::PriceSource;
use primitive_types::U256;
use std::cell::RefCell;
use std::collections::HashMap;

struct TestOracle {
    prices: RefCell<HashMap<String, U256>>,
}

impl TestOracle {
    fn new() -> Self {
        Self { prices: RefCell::new(HashMap::new()) }
    }

    fn set(&self, token: &TokenId, price: U256) {
        self.prices.borrow_mut().insert(token.0.clone(), price);
    }
}

impl PriceSource for TestOracle {
    fn price(&self, token: &TokenId, _now: u64) -> Result<U256, EngineError> {
        self.prices
            .borrow()
            .get(&token.0)
            .copied()
            .ok_or_else(|| EngineError::UnknownReserve(token.0.clone()))
    }
}

fn token_units(whole: u64, decimals: u32) -> U256 {
    U256::from(whole) * u256_pow10(decimals)
}

/// Tenths of a unit, e.g. `tenths(81, 18) == 8.1 * 10^18`.
fn tenths(tenths: u64, decimals: u32) -> U256 {
    U256::from(tenths) * u256_pow10(decimals - 1)
}

fn flat_irm() -> IrmParams {
    IrmParams::new(U256::zero(), U256::zero(), U256::zero(), scale()).unwrap()
}

/// Registers reserves A (collateral, cf=0.5) and B (borrowable, bf=0.9),
/// both 18-decimal, prices A=$50/B=$100, 0 reserve factor and no flash-loan
/// fee unless a test overrides it. Alice deposits 100 A and enables it as
/// collateral; Bob deposits 10000 B. All at `now = 0`.
fn setup() -> (Market, InMemoryAssetLedger, TestOracle, UserId, UserId, UserId, TokenId, TokenId) {
    let owner = UserId::new("owner");
    let treasury = UserId::new("treasury");
    let market_id = UserId::new("market");
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let token_a = TokenId::new("A");
    let token_b = TokenId::new("B");

    let mut market = Market::new(MarketConfig::new(owner.clone(), treasury, market_id));
    market
        .add_reserve(&owner, token_a.clone(), 18, scale() / U256::from(2u8), scale(), U256::zero(), U256::zero(), flat_irm(), 0, &NullEventSink)
        .unwrap();
    market
        .add_reserve(
            &owner,
            token_b.clone(),
            18,
            U256::zero(),
            scale() / U256::from(10u8) * U256::from(9u8),
            U256::zero(),
            U256::zero(),
            flat_irm(),
            0,
            &NullEventSink,
        )
        .unwrap();

    let ledger = InMemoryAssetLedger::new();
    let oracle = TestOracle::new();
    oracle.set(&token_a, token_units(50, 8)); // $50 at 8dp
    oracle.set(&token_b, token_units(100, 8));

    ledger.mint(&alice, &token_a, token_units(100, 18));
    ledger.mint(&bob, &token_b, token_units(1_000_000, 18));

    market.deposit(&alice, &token_a, token_units(100, 18), 0, &ledger, &NullEventSink).unwrap();
    market.enable_collateral(&alice, &token_a, &NullEventSink).unwrap();
    market.deposit(&bob, &token_b, token_units(10_000, 18), 0, &ledger, &NullEventSink).unwrap();

    (market, ledger, oracle, alice, bob, owner, token_a, token_b)
}

#[test]
fn deposit_then_withdraw_all_round_trips_exactly() {
    let (mut market, ledger, oracle, alice, _bob, _owner, token_a, _token_b) = setup();
    let withdrawn = market.withdraw_all(&alice, &token_a, 0, &ledger, &oracle, &NullEventSink).unwrap();
    assert_eq!(withdrawn, token_units(100, 18));
    assert_eq!(ledger.balance_of(&alice, &token_a), token_units(100, 18));
}

#[test]
fn borrow_at_exact_solvency_boundary_succeeds() {
    let (mut market, ledger, oracle, alice, _bob, _owner, _token_a, token_b) = setup();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();
    assert_eq!(ledger.balance_of(&alice, &token_b), tenths(225, 18));
}

#[test]
fn borrow_one_unit_past_the_boundary_fails_and_leaves_no_trace() {
    let (mut market, ledger, oracle, alice, _bob, _owner, _token_a, token_b) = setup();
    let err = market
        .borrow(&alice, &token_b, tenths(226, 18), 0, &ledger, &oracle, &NullEventSink)
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientCollateral { .. }));
    assert_eq!(ledger.balance_of(&alice, &token_b), U256::zero());
    assert!(market.face_debt(&alice, 1).unwrap().is_zero());
}

#[test]
fn liquidation_within_the_boundary_succeeds_and_seizes_proportional_collateral() {
    let (mut market, ledger, oracle, alice, bob, _owner, token_a, token_b) = setup();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();

    // A's price drops from $50 to $40; Alice is now undercollateralized.
    oracle.set(&token_a, token_units(40, 8));
    assert!(!market.is_solvent(&alice, &oracle, 0).unwrap());

    let bob_b_before = ledger.balance_of(&bob, &token_b);
    market
        .liquidate(&bob, &alice, &token_b, tenths(81, 18), &token_a, 0, &ledger, &oracle, &NullEventSink)
        .unwrap();

    assert_eq!(ledger.balance_of(&bob, &token_b), bob_b_before - tenths(81, 18));
    assert_eq!(market.face_debt(&alice, 1).unwrap(), tenths(144, 18));
    assert_eq!(market.face_z_balance(&bob, 0).unwrap(), tenths(2025, 17)); // 20.25 A
    assert_eq!(market.face_z_balance(&alice, 0).unwrap(), tenths(7975, 17)); // 79.75 A
}

#[test]
fn liquidation_past_the_boundary_overcorrects_and_fails_without_mutating_state() {
    let (mut market, ledger, oracle, alice, bob, _owner, token_a, token_b) = setup();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();
    oracle.set(&token_a, token_units(40, 8));

    let bob_b_before = ledger.balance_of(&bob, &token_b);
    let alice_debt_before = market.face_debt(&alice, 1).unwrap();
    let alice_collateral_before = market.face_z_balance(&alice, 0).unwrap();

    let err = market
        .liquidate(&bob, &alice, &token_b, token_units(9, 18), &token_a, 0, &ledger, &oracle, &NullEventSink)
        .unwrap_err();

    assert_eq!(err, EngineError::InvalidLiquidation);
    assert_eq!(ledger.balance_of(&bob, &token_b), bob_b_before);
    assert_eq!(market.face_debt(&alice, 1).unwrap(), alice_debt_before);
    assert_eq!(market.face_z_balance(&alice, 0).unwrap(), alice_collateral_before);
}

#[test]
fn liquidation_against_a_solvent_borrower_is_rejected() {
    let (mut market, ledger, oracle, alice, bob, _owner, token_a, token_b) = setup();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();
    // No price movement: Alice is still exactly at the boundary (solvent).
    let err = market
        .liquidate(&bob, &alice, &token_b, U256::from(1u8), &token_a, 0, &ledger, &oracle, &NullEventSink)
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidLiquidation);
}

#[test]
fn disabling_collateral_backing_outstanding_debt_is_rejected() {
    let (mut market, ledger, oracle, alice, _bob, _owner, token_a, token_b) = setup();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();

    let err = market.disable_collateral(&alice, &token_a, &oracle, 0, &NullEventSink).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientCollateral { .. }));
}

#[test]
fn disabling_collateral_with_no_debt_succeeds() {
    let (mut market, _ledger, oracle, alice, _bob, _owner, token_a, _token_b) = setup();
    market.disable_collateral(&alice, &token_a, &oracle, 0, &NullEventSink).unwrap();
    assert!(market.collateral_mask(&alice).is_empty());
}

#[test]
fn paused_reserve_rejects_deposit_and_borrow() {
    let (mut market, ledger, oracle, alice, _bob, owner, token_a, token_b) = setup();
    market.pause(&owner, &token_a, &NullEventSink).unwrap();

    let err = market.deposit(&alice, &token_a, token_units(1, 18), 0, &ledger, &NullEventSink).unwrap_err();
    assert_eq!(err, EngineError::Paused("A".to_string()));

    market.pause(&owner, &token_b, &NullEventSink).unwrap();
    let err = market
        .borrow(&alice, &token_b, U256::from(1u8), 0, &ledger, &oracle, &NullEventSink)
        .unwrap_err();
    assert_eq!(err, EngineError::Paused("B".to_string()));
}

#[test]
fn flash_loan_full_repayment_succeeds_and_retains_the_fee() {
    let (mut market, ledger, _oracle, _alice, _bob, owner, _token_a, token_b) = setup();
    market
        .set_flash_loan_fee(&owner, &token_b, scale() / U256::from(100u8), &NullEventSink)
        .unwrap();

    let receiver_id = UserId::new("flash-receiver");
    ledger.mint(&receiver_id, &token_b, token_units(10, 18)); // pre-funded to cover the fee
    let receiver = MockFlashLoanReceiver::new(receiver_id.clone(), RepayBehavior::Full);

    let market_balance_before = ledger.balance_of(&UserId::new("market"), &token_b);
    market
        .flash_loan(&token_b, token_units(100, 18), &receiver, &receiver_id, &[], 0, &ledger, &NullEventSink)
        .unwrap();

    let expected_fee = token_units(1, 18); // 1% of 100
    assert_eq!(ledger.balance_of(&UserId::new("market"), &token_b), market_balance_before + expected_fee);
    assert!(!market.reserve(1).unwrap().flash_loan_guard);
}

#[test]
fn flash_loan_without_repayment_fails_and_restores_the_guard() {
    let (mut market, ledger, _oracle, _alice, _bob, owner, _token_a, token_b) = setup();
    market
        .set_flash_loan_fee(&owner, &token_b, scale() / U256::from(100u8), &NullEventSink)
        .unwrap();

    let receiver_id = UserId::new("flash-receiver");
    let receiver = MockFlashLoanReceiver::new(receiver_id.clone(), RepayBehavior::None);

    let err = market
        .flash_loan(&token_b, token_units(100, 18), &receiver, &receiver_id, &[], 0, &ledger, &NullEventSink)
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientRepaid { .. }));
    assert!(!market.reserve(1).unwrap().flash_loan_guard);
}

#[test]
fn flash_loan_scenario_6_boundary_one_unit_short_fails_exact_repayment_succeeds() {
    // spec.md §8 scenario 6: 5% fee, borrow 100 A, `105e18 - 1` fails,
    // exactly `105e18` succeeds, net effect on market balance is +5 A.
    let (mut market, ledger, _oracle, _alice, _bob, owner, token_a, _token_b) = setup();
    market
        .set_flash_loan_fee(&owner, &token_a, scale() / U256::from(100u8) * U256::from(5u8), &NullEventSink)
        .unwrap();
    let market_id = UserId::new("market");
    let market_balance_before = ledger.balance_of(&market_id, &token_a);

    let short_receiver_id = UserId::new("flash-receiver-short");
    ledger.mint(&short_receiver_id, &token_a, token_units(5, 18));
    let short_receiver = MockFlashLoanReceiver::new(short_receiver_id.clone(), RepayBehavior::Short(U256::one()));
    let err = market
        .flash_loan(&token_a, token_units(100, 18), &short_receiver, &short_receiver_id, &[], 0, &ledger, &NullEventSink)
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientRepaid { .. }));
    assert_eq!(ledger.balance_of(&market_id, &token_a), market_balance_before);

    let full_receiver_id = UserId::new("flash-receiver-full");
    ledger.mint(&full_receiver_id, &token_a, token_units(5, 18));
    let full_receiver = MockFlashLoanReceiver::new(full_receiver_id.clone(), RepayBehavior::Full);
    market
        .flash_loan(&token_a, token_units(100, 18), &full_receiver, &full_receiver_id, &[], 0, &ledger, &NullEventSink)
        .unwrap();
    assert_eq!(ledger.balance_of(&market_id, &token_a), market_balance_before + token_units(5, 18));
}

#[test]
fn flash_loan_short_repayment_fails_and_restores_the_guard() {
    let (mut market, ledger, _oracle, _alice, _bob, owner, _token_a, token_b) = setup();
    market
        .set_flash_loan_fee(&owner, &token_b, scale() / U256::from(100u8), &NullEventSink)
        .unwrap();

    let receiver_id = UserId::new("flash-receiver");
    ledger.mint(&receiver_id, &token_b, token_units(10, 18));
    let receiver = MockFlashLoanReceiver::new(receiver_id.clone(), RepayBehavior::Short(U256::from(1u8)));

    let err = market
        .flash_loan(&token_b, token_units(100, 18), &receiver, &receiver_id, &[], 0, &ledger, &NullEventSink)
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientRepaid { .. }));
    assert!(!market.reserve(1).unwrap().flash_loan_guard);
}

#[test]
fn interest_accrues_over_time_and_accumulators_never_shrink() {
    // A non-trivial IRM (spec.md §8 scenario 1's curve) so there's a nonzero
    // borrow rate to accrue against, unlike `setup()`'s flat zero-rate curve
    // (which the boundary tests above rely on staying exactly at `SCALE`
    // since they never advance time).
    let irm = IrmParams::new(
        U256::from(10u128).pow(U256::from(26u32)),
        U256::from(5u128) * U256::from(10u128).pow(U256::from(26u32)),
        U256::from(10u128).pow(U256::from(25u32)),
        U256::from(6u128) * U256::from(10u128).pow(U256::from(26u32)),
    )
    .unwrap();

    let owner = UserId::new("owner");
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let token_a = TokenId::new("A");
    let token_b = TokenId::new("B");

    let mut market = Market::new(MarketConfig::new(owner.clone(), UserId::new("treasury"), UserId::new("market")));
    market
        .add_reserve(&owner, token_a.clone(), 18, scale() / U256::from(2u8), scale(), U256::zero(), U256::zero(), flat_irm(), 0, &NullEventSink)
        .unwrap();
    market
        .add_reserve(&owner, token_b.clone(), 18, U256::zero(), scale() / U256::from(10u8) * U256::from(9u8), U256::zero(), U256::zero(), irm, 0, &NullEventSink)
        .unwrap();

    let ledger = InMemoryAssetLedger::new();
    let oracle = TestOracle::new();
    oracle.set(&token_a, token_units(50, 8));
    oracle.set(&token_b, token_units(100, 8));
    ledger.mint(&alice, &token_a, token_units(100, 18));
    ledger.mint(&bob, &token_b, token_units(10_000, 18));

    market.deposit(&alice, &token_a, token_units(100, 18), 0, &ledger, &NullEventSink).unwrap();
    market.enable_collateral(&alice, &token_a, &NullEventSink).unwrap();
    market.deposit(&bob, &token_b, token_units(10_000, 18), 0, &ledger, &NullEventSink).unwrap();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();

    let debt_accumulator_before = market.reserve(1).unwrap().debt_accumulator;
    let lending_accumulator_before = market.reserve(1).unwrap().lending_accumulator;
    let borrow_rate = market.reserve(1).unwrap().current_borrowing_rate;
    assert!(borrow_rate > U256::zero());

    market.touch_reserve(1, 100, &ledger, &NullEventSink).unwrap();

    let debt_accumulator_after = market.reserve(1).unwrap().debt_accumulator;
    let lending_accumulator_after = market.reserve(1).unwrap().lending_accumulator;
    assert!(debt_accumulator_after > debt_accumulator_before); // P1: non-decreasing (here strictly growing)
    assert!(lending_accumulator_after >= lending_accumulator_before);

    let growth = FixedMath::div(FixedMath::mul(borrow_rate, U256::from(100u64)).unwrap(), U256::from(SECONDS_PER_YEAR)).unwrap();
    let expected_debt_accumulator = FixedMath::mul_fp(debt_accumulator_before, FixedMath::add(scale(), growth).unwrap()).unwrap();
    assert_eq!(debt_accumulator_after, expected_debt_accumulator);

    let face_debt_after = market.face_debt(&alice, 1).unwrap();
    assert!(face_debt_after > tenths(225, 18)); // debt grew past the 22.5 B principal
}

#[test]
fn repay_all_zeroes_debt_exactly_even_after_interest_has_accrued() {
    let irm = IrmParams::new(
        U256::from(10u128).pow(U256::from(26u32)),
        U256::from(5u128) * U256::from(10u128).pow(U256::from(26u32)),
        U256::from(10u128).pow(U256::from(25u32)),
        U256::from(6u128) * U256::from(10u128).pow(U256::from(26u32)),
    )
    .unwrap();

    let owner = UserId::new("owner");
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let token_a = TokenId::new("A");
    let token_b = TokenId::new("B");

    let mut market = Market::new(MarketConfig::new(owner.clone(), UserId::new("treasury"), UserId::new("market")));
    market
        .add_reserve(&owner, token_a.clone(), 18, scale() / U256::from(2u8), scale(), U256::zero(), U256::zero(), flat_irm(), 0, &NullEventSink)
        .unwrap();
    market
        .add_reserve(&owner, token_b.clone(), 18, U256::zero(), scale() / U256::from(10u8) * U256::from(9u8), U256::zero(), U256::zero(), irm, 0, &NullEventSink)
        .unwrap();

    let ledger = InMemoryAssetLedger::new();
    let oracle = TestOracle::new();
    oracle.set(&token_a, token_units(50, 8));
    oracle.set(&token_b, token_units(100, 8));
    ledger.mint(&alice, &token_a, token_units(100, 18));
    ledger.mint(&bob, &token_b, token_units(1_000_000, 18));

    market.deposit(&alice, &token_a, token_units(100, 18), 0, &ledger, &NullEventSink).unwrap();
    market.enable_collateral(&alice, &token_a, &NullEventSink).unwrap();
    market.deposit(&bob, &token_b, token_units(10_000, 18), 0, &ledger, &NullEventSink).unwrap();
    market.borrow(&alice, &token_b, tenths(225, 18), 0, &ledger, &oracle, &NullEventSink).unwrap();
    market.touch_reserve(1, 100, &ledger, &NullEventSink).unwrap();

    let face_owed = market.face_debt(&alice, 1).unwrap();
    ledger.mint(&alice, &token_b, face_owed); // top up so she can fully repay the accrued amount

    let repaid = market.repay_all(&alice, &token_b, 100, &ledger, &NullEventSink).unwrap();
    assert_eq!(repaid, face_owed);
    assert!(market.face_debt(&alice, 1).unwrap().is_zero());
    assert_eq!(market.reserve(1).unwrap().raw_total_debt, U256::zero());
}
