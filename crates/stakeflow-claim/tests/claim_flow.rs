//! Claim Token Ledger integration tests: FIFO settlement, mismatch
//! rejection, exchange-rate round trips.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use stakeflow_claim::ClaimLedger;
use stakeflow_types::*;

/// Helper: a claim ledger whose bridge is funded in custody.
struct ClaimHarness {
    claim: ClaimLedger,
    custody: MemoryCustody,
    bridge: AccountId,
}

impl ClaimHarness {
    fn new() -> Self {
        let owner = AccountId::new();
        let bridge = AccountId::new();
        let mut claim = ClaimLedger::new(owner, bridge, ClaimConfig::default()).unwrap();
        claim.set_bridge(owner, bridge).unwrap();
        Self {
            claim,
            custody: MemoryCustody::new(),
            bridge,
        }
    }

    fn user(&mut self, funds: Decimal) -> AccountId {
        let user = AccountId::new();
        self.custody.mint(&user, funds);
        user
    }

    fn settle(&mut self, amount: Decimal) -> Result<usize> {
        self.claim.handle_redeem(&mut self.custody, self.bridge, amount)
    }

    fn queue_amounts(&self) -> Vec<Decimal> {
        self.claim
            .redeem_queue(0, usize::MAX)
            .into_iter()
            .map(|e| e.amount)
            .collect()
    }
}

// ============================================================================
// FIFO settlement
// ============================================================================

#[test]
fn handle_redeem_consumes_exactly_one_entry() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(3));
    h.claim.deposit(&mut h.custody, user, Decimal::from(3)).unwrap();
    h.claim.redeem(user, Decimal::ONE).unwrap();
    h.claim.redeem(user, Decimal::ONE).unwrap();
    assert_eq!(h.claim.redeem_len(), 2);
    assert_eq!(h.claim.total_claimed(), Decimal::from(2));

    // Deposits were forwarded to the bridge, which now pays one entry back.
    assert_eq!(h.settle(Decimal::ONE).unwrap(), 1);
    assert_eq!(h.claim.redeem_len(), 1);
    assert_eq!(h.claim.total_claimed(), Decimal::ONE);
    assert_eq!(h.claim.user_withdrawable(&user), Decimal::ONE);
    assert_eq!(h.claim.first_redeem_amount(), Decimal::ONE);
}

#[test]
fn mismatched_amount_leaves_queue_unchanged() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(100));
    h.claim.deposit(&mut h.custody, user, Decimal::from(100)).unwrap();
    for tokens in [10, 20, 30] {
        h.claim.redeem(user, Decimal::from(tokens)).unwrap();
    }
    let before = h.queue_amounts();
    let bridge_before = h.custody.balance_of(&h.bridge);

    for bad in [5, 15, 25, 45, 59] {
        let err = h.settle(Decimal::from(bad)).unwrap_err();
        assert!(
            matches!(err, StakeflowError::RedeemAmountNotMatch { .. }),
            "{bad}: {err}"
        );
        assert_eq!(h.queue_amounts(), before);
    }
    assert_eq!(h.custody.balance_of(&h.bridge), bridge_before);
    assert_eq!(h.claim.total_claimed(), Decimal::from(60));

    // Valid prefix sums settle in order.
    assert_eq!(h.settle(Decimal::from(30)).unwrap(), 2);
    assert_eq!(h.queue_amounts(), vec![Decimal::from(30)]);
}

#[test]
fn oversupply_is_rejected() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(10));
    h.claim.deposit(&mut h.custody, user, Decimal::from(10)).unwrap();
    h.claim.redeem(user, Decimal::from(4)).unwrap();
    let err = h.settle(Decimal::from(5)).unwrap_err();
    assert!(matches!(
        err,
        StakeflowError::RedeemAmountNotMatch { matched, .. } if matched == Decimal::from(4)
    ));
}

#[test]
fn settled_value_is_withdrawable() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(10));
    h.claim.deposit(&mut h.custody, user, Decimal::from(10)).unwrap();
    h.claim.redeem(user, Decimal::from(4)).unwrap();

    let err = h
        .claim
        .withdraw(&mut h.custody, user, Decimal::ONE)
        .unwrap_err();
    assert!(matches!(err, StakeflowError::InsufficientWithdrawable { .. }));

    h.settle(Decimal::from(4)).unwrap();
    h.claim
        .withdraw(&mut h.custody, user, Decimal::from(3))
        .unwrap();
    assert_eq!(h.custody.balance_of(&user), Decimal::from(3));
    assert_eq!(h.claim.user_withdrawable(&user), Decimal::ONE);

    assert!(matches!(
        h.claim.withdraw(&mut h.custody, user, Decimal::ZERO),
        Err(StakeflowError::ZeroAmount)
    ));
}

#[test]
fn contract_balance_shortfall() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(10));
    h.claim.deposit(&mut h.custody, user, Decimal::from(10)).unwrap();
    h.claim.redeem(user, Decimal::from(4)).unwrap();
    h.settle(Decimal::from(4)).unwrap();

    // Value leaves the ledger's custody behind its back.
    let address = h.claim.address();
    h.custody
        .transfer(&address, &AccountId::new(), Decimal::from(2))
        .unwrap();
    let err = h
        .claim
        .withdraw(&mut h.custody, user, Decimal::from(4))
        .unwrap_err();
    assert!(matches!(
        err,
        StakeflowError::InsufficientContractBalance { .. }
    ));
}

// ============================================================================
// Exchange rate
// ============================================================================

#[test]
fn deposit_redeem_round_trip_within_one_unit() {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut h = ClaimHarness::new();
    let whale = h.user(Decimal::from(1_000_000));
    h.claim
        .deposit(&mut h.custody, whale, Decimal::from(1000))
        .unwrap();

    for _ in 0..50 {
        // Move the rate by a random reward or penalty.
        let delta = Decimal::new(rng.gen_range(1..5_000), 2);
        if rng.gen_bool(0.7) {
            h.claim.add_assets(h.bridge, delta).unwrap();
        } else if delta < h.claim.total_deposited() / Decimal::TWO {
            h.claim.deduct_assets(h.bridge, delta).unwrap();
        }

        let value = Decimal::new(rng.gen_range(1..1_000_000), 3);
        let user = h.user(value);
        let tokens = h.claim.deposit(&mut h.custody, user, value).unwrap();
        let back = h.claim.redeem(user, tokens).unwrap();
        assert!(
            (value - back).abs() <= Decimal::ONE,
            "deposited {value}, redeemed {back}"
        );
    }
}

#[test]
fn total_claimed_tracks_queue() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut h = ClaimHarness::new();
    let users: Vec<AccountId> = (0..4).map(|_| h.user(Decimal::from(10_000))).collect();
    for user in &users {
        h.claim
            .deposit(&mut h.custody, *user, Decimal::from(1_000))
            .unwrap();
    }

    for _ in 0..200 {
        let user = users[rng.gen_range(0..users.len())];
        if rng.gen_bool(0.6) {
            let balance = h.claim.balance_of(&user);
            if balance > Decimal::ONE {
                h.claim.redeem(user, Decimal::ONE).unwrap();
            }
        } else if h.claim.redeem_len() > 0 {
            let n = rng.gen_range(1..=h.claim.redeem_len());
            let amount = h.claim.redeem_prefix_sum(n);
            assert_eq!(h.settle(amount).unwrap(), n);
        }
        let queued: Decimal = h.queue_amounts().into_iter().sum();
        assert_eq!(h.claim.total_claimed(), queued);
    }
}

#[test]
fn events_recorded_for_every_mutation() {
    let mut h = ClaimHarness::new();
    let user = h.user(Decimal::from(5));
    h.claim.deposit(&mut h.custody, user, Decimal::from(5)).unwrap();
    h.claim.redeem(user, Decimal::from(2)).unwrap();
    h.settle(Decimal::from(2)).unwrap();
    h.claim
        .withdraw(&mut h.custody, user, Decimal::from(2))
        .unwrap();

    let ops: Vec<Operation> = h.claim.journal().events().map(|e| e.operation).collect();
    assert_eq!(
        ops,
        vec![
            Operation::SetBridge,
            Operation::Deposit,
            Operation::Redeem,
            Operation::HandleRedeem,
            Operation::Withdraw,
        ]
    );
    let last = h.claim.journal().last().unwrap();
    assert_eq!(last.ledger, LedgerKind::Claim);
    assert_eq!(last.summary["total_claimed"], Decimal::ZERO);
}
