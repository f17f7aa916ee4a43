//! End-to-end reconciliation: deposits flowing into stake, interest
//! reaching token holders, redemptions settled through unstaking, the
//! governance relay, failure isolation and tick scheduling.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use stakeflow_reconcile::*;
use stakeflow_types::constants::{DEFAULT_LOCK_PERIOD, DEFAULT_UNLOCK_PERIOD};
use stakeflow_types::*;

type TestEngine = Engine<MemoryRegistry, MemoryVoteEscrow, MemoryCustody>;

/// Helper: an engine with a registered pool (owner holds one vote).
struct Harness {
    engine: TestEngine,
    owner: AccountId,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let owner = AccountId::new();
        let mut custody = MemoryCustody::new();
        custody.mint(&owner, Decimal::from(10_000));
        let mut engine = Engine::new(
            owner,
            config,
            MemoryRegistry::new(),
            MemoryVoteEscrow::new(),
            custody,
        )
        .unwrap();
        engine
            .pool
            .register(
                &mut engine.custody,
                owner,
                PosIdentity([7; 32]),
                1,
                Decimal::from(1000),
                b"bls-proof",
            )
            .unwrap();
        Self { engine, owner }
    }

    fn depositor(&mut self, value: i64) -> AccountId {
        let user = AccountId::new();
        self.engine.custody.mint(&user, Decimal::from(value));
        self.engine
            .claim
            .deposit(&mut self.engine.custody, user, Decimal::from(value))
            .unwrap();
        user
    }

    fn reward(&mut self, amount: Decimal) {
        let address = self.engine.pool.address();
        self.engine.custody.mint(&address, amount);
    }

    fn tick(&mut self) -> TickReport {
        self.engine.tick()
    }

    fn controller_balance(&self) -> Decimal {
        self.engine
            .custody
            .balance_of(&self.engine.controller().account())
    }

    fn registry_votes(&self) -> u64 {
        let registry = self.engine.pool.registry();
        registry.staked() + registry.unstaking()
    }
}

// ============================================================================
// Settlement steps
// ============================================================================

#[test]
fn deposit_is_pulled_and_staked_then_second_tick_is_noop() {
    let mut h = Harness::new();
    h.depositor(2500);
    let mapped = h.engine.controller().mapped();
    assert_eq!(h.engine.custody.balance_of(&mapped), Decimal::from(2500));

    let first = h.tick();
    assert!(first.failures.is_empty(), "{:?}", first.failures);
    assert_eq!(
        first.actions,
        vec![
            Action::PulledCustody {
                amount: Decimal::from(2500)
            },
            Action::Staked { votes: 2 },
        ]
    );
    assert_eq!(h.controller_balance(), Decimal::from(500));
    assert_eq!(h.engine.pool.user_summary(&h.engine.controller().account()).votes, 2);
    assert_eq!(h.registry_votes(), 3);

    let writes = h.engine.pool.registry().write_calls();
    let second = h.tick();
    assert!(second.is_noop());
    assert!(second.failures.is_empty());
    assert_eq!(second.tick, 2);
    assert_eq!(h.engine.pool.registry().write_calls(), writes);
}

#[test]
fn claimed_interest_is_split_between_reserve_and_token_assets() {
    let mut h = Harness::new();
    h.depositor(2500);
    h.tick();

    // Three votes share 300: the controller's two earn 200, 99% of it theirs.
    h.reward(Decimal::from(300));
    let report = h.tick();
    assert_eq!(
        report.actions,
        vec![Action::ClaimedInterest {
            amount: Decimal::from(198),
            reserved: Decimal::new(198, 1),
            added: Decimal::new(1782, 1),
        }]
    );
    assert_eq!(h.engine.controller().reserved_interest(), Decimal::new(198, 1));
    assert_eq!(h.engine.claim.total_deposited(), Decimal::new(26782, 1));
    assert_eq!(h.engine.claim.exchange_rate().unwrap(), Decimal::new(107_128, 5));
    // 698 liquid less 19.8 reserved is under one vote.
    assert_eq!(h.controller_balance(), Decimal::from(698));
    assert!(h.tick().is_noop());
}

#[test]
fn reserved_interest_withdrawal_is_owner_gated_and_bounded() {
    let mut h = Harness::new();
    h.depositor(2500);
    h.tick();
    h.reward(Decimal::from(300));
    h.tick();

    let stranger = AccountId::new();
    assert!(matches!(
        h.engine.withdraw_reserved_interest(stranger, Decimal::ONE),
        Err(StakeflowError::NotOwner { .. })
    ));
    assert!(matches!(
        h.engine.withdraw_reserved_interest(h.owner, Decimal::from(20)),
        Err(StakeflowError::InsufficientPoolInterest { .. })
    ));

    let before = h.engine.custody.balance_of(&h.owner);
    h.engine
        .withdraw_reserved_interest(h.owner, Decimal::new(198, 1))
        .unwrap();
    assert_eq!(
        h.engine.custody.balance_of(&h.owner) - before,
        Decimal::new(198, 1)
    );
    assert_eq!(h.engine.controller().reserved_interest(), Decimal::ZERO);
    let event = h.engine.controller().journal().last().unwrap();
    assert_eq!(event.operation, Operation::WithdrawReservedInterest);
    assert!(event.verify_hash());
}

#[test]
fn redemption_unstakes_rounded_up_and_settles_after_unlock() {
    let mut h = Harness::new();
    let user = h.depositor(2500);
    h.tick();
    h.engine.advance_blocks(DEFAULT_LOCK_PERIOD);

    let value = h.engine.claim.redeem(user, Decimal::from(2000)).unwrap();
    assert_eq!(value, Decimal::from(2000));

    // 500 liquid: ceil(1500 / 1000) = 2 votes.
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::Unstaked { votes: 2 }]);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let account = h.engine.controller().account();
    assert_eq!(h.engine.pool.user_summary(&account).unlocking(), 2);

    // Unlocking votes already cover the claim.
    assert!(h.tick().is_noop());

    h.engine.advance_blocks(DEFAULT_UNLOCK_PERIOD);
    let report = h.tick();
    assert_eq!(
        report.actions,
        vec![
            Action::WithdrewVotes { votes: 2 },
            Action::SettledRedemptions {
                entries: 1,
                amount: Decimal::from(2000),
            },
        ]
    );
    assert_eq!(h.engine.claim.redeem_len(), 0);
    assert_eq!(h.engine.claim.total_claimed(), Decimal::ZERO);
    assert_eq!(h.engine.claim.user_withdrawable(&user), Decimal::from(2000));
    assert_eq!(h.controller_balance(), Decimal::from(500));
    assert_eq!(h.registry_votes(), 1);

    h.engine
        .claim
        .withdraw(&mut h.engine.custody, user, Decimal::from(2000))
        .unwrap();
    assert_eq!(h.engine.custody.balance_of(&user), Decimal::from(2000));
}

#[test]
fn unstake_is_capped_at_locked_votes() {
    let mut h = Harness::new();
    let early = h.depositor(1500);
    h.tick();
    h.engine.advance_blocks(DEFAULT_LOCK_PERIOD);
    let late = h.depositor(2000);
    h.tick();
    // One vote locked, two still locking; 500 liquid.
    let account = h.engine.controller().account();
    assert_eq!(h.engine.pool.user_summary(&account).locked, 1);

    h.engine.claim.redeem(early, Decimal::from(1500)).unwrap();
    h.engine.claim.redeem(late, Decimal::from(2000)).unwrap();
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::Unstaked { votes: 1 }]);
    let failure = report.failure(Step::SettleRedemptions).unwrap();
    assert_eq!(failure.code, "SF_ERR_310");
    assert_eq!(failure.class, ErrorClass::Insufficiency);
}

#[test]
fn queue_is_drained_in_bounded_batches() {
    let mut config = EngineConfig::default();
    config.controller.max_redeem_per_call = 2;
    let mut h = Harness::with_config(config);
    let users: Vec<_> = (0..5).map(|_| h.depositor(100)).collect();
    for user in &users {
        h.engine.claim.redeem(*user, Decimal::from(100)).unwrap();
    }

    let report = h.tick();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(
        report.actions,
        vec![
            Action::PulledCustody {
                amount: Decimal::from(500)
            },
            Action::SettledRedemptions {
                entries: 2,
                amount: Decimal::from(200)
            },
            Action::SettledRedemptions {
                entries: 2,
                amount: Decimal::from(200)
            },
            Action::SettledRedemptions {
                entries: 1,
                amount: Decimal::from(100)
            },
        ]
    );
    for user in &users {
        assert_eq!(h.engine.claim.user_withdrawable(user), Decimal::from(100));
    }
}

#[test]
fn reserve_shortfall_with_empty_queue_unstakes_one_vote() {
    let mut h = Harness::new();
    let user = h.depositor(2000);
    h.tick();
    assert_eq!(h.controller_balance(), Decimal::ZERO);
    h.engine.advance_blocks(DEFAULT_LOCK_PERIOD);

    h.reward(Decimal::from(300));
    h.tick();
    assert_eq!(h.engine.controller().reserved_interest(), Decimal::new(198, 1));
    assert_eq!(h.controller_balance(), Decimal::from(198));

    // 170 tokens at 2178.2 / 2000 are worth 185.147, paid from liquid funds.
    let value = h.engine.claim.redeem(user, Decimal::from(170)).unwrap();
    assert_eq!(value, Decimal::new(185_147, 3));
    let report = h.tick();
    assert_eq!(
        report.actions,
        vec![Action::SettledRedemptions {
            entries: 1,
            amount: Decimal::new(185_147, 3),
        }]
    );
    assert_eq!(h.engine.claim.redeem_len(), 0);
    assert_eq!(h.controller_balance(), Decimal::new(12_853, 3));

    // Queue empty, 12.853 liquid against 19.8 reserved.
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::Unstaked { votes: 1 }]);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    let account = h.engine.controller().account();
    assert_eq!(h.engine.pool.user_summary(&account).unlocking(), 1);
    assert!(h.tick().is_noop());

    h.engine.advance_blocks(DEFAULT_UNLOCK_PERIOD);
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::WithdrewVotes { votes: 1 }]);
    assert_eq!(h.controller_balance(), Decimal::new(1_012_853, 3));
    assert!(h.controller_balance() >= h.engine.controller().reserved_interest());
    assert!(h.tick().is_noop());
}

#[test]
fn first_redemption_is_settled_only_when_covered() {
    let mut h = Harness::new();
    let user = h.depositor(2500);
    h.tick();
    assert_eq!(h.controller_balance(), Decimal::from(500));

    let stranger = AccountId::new();
    assert!(matches!(
        h.engine.settle_first_redemption(stranger),
        Err(StakeflowError::NotOwner { .. })
    ));
    assert_eq!(h.engine.settle_first_redemption(h.owner).unwrap(), None);

    h.engine.claim.redeem(user, Decimal::from(400)).unwrap();
    h.engine.claim.redeem(user, Decimal::from(1000)).unwrap();
    assert_eq!(
        h.engine.settle_first_redemption(h.owner).unwrap(),
        Some(Decimal::from(400))
    );
    assert_eq!(h.engine.claim.redeem_len(), 1);
    assert_eq!(h.engine.claim.total_claimed(), Decimal::from(1000));
    assert_eq!(h.engine.claim.user_withdrawable(&user), Decimal::from(400));
    assert_eq!(h.controller_balance(), Decimal::from(100));

    // 1000 at the head, 100 liquid.
    assert_eq!(h.engine.settle_first_redemption(h.owner).unwrap(), None);
    assert_eq!(h.engine.claim.redeem_len(), 1);
    assert_eq!(h.controller_balance(), Decimal::from(100));
}

// ============================================================================
// Governance relay
// ============================================================================

#[test]
fn lock_relay_forwards_changes_once() {
    let mut h = Harness::new();
    h.engine.escrow.set_lock(Decimal::from(5000), 100);

    let report = h.tick();
    assert_eq!(
        report.actions,
        vec![Action::LockRelayed {
            amount: Decimal::from(5000),
            unlock_block: 100,
        }]
    );
    assert_eq!(h.engine.pool.registry().locks(), &[(Decimal::from(5000), 100)]);
    assert!(h.tick().is_noop());

    // Expired escrow locks are not relayed.
    h.engine.advance_blocks(200);
    h.engine.escrow.set_lock(Decimal::from(7000), 100);
    assert!(h.tick().is_noop());
    assert_eq!(h.engine.pool.registry().locks().len(), 1);
}

#[test]
fn vote_relay_forwards_tallies_for_current_round() {
    let mut h = Harness::new();
    assert!(h.tick().is_noop());

    h.engine.escrow.set_round(1);
    h.engine.escrow.set_votes(
        1,
        0,
        [Decimal::from(3), Decimal::ZERO, Decimal::ONE],
    );
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::VoteRelayed { round: 1, topics: 3 }]);
    let cast = h.engine.pool.registry().cast_votes();
    assert_eq!(cast.len(), 1);
    assert_eq!(cast[0].0, 1);
    assert_eq!(cast[0].1[0].votes[0], Decimal::from(3));
    assert!(h.tick().is_noop());

    h.engine.escrow.set_votes(1, 2, [Decimal::ONE, Decimal::ONE, Decimal::ONE]);
    assert_eq!(h.tick().actions.len(), 1);
    assert_eq!(h.engine.pool.registry().cast_votes().len(), 2);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn escrow_failure_does_not_block_settlement() {
    let mut h = Harness::new();
    h.engine.escrow.set_failing(true);
    h.depositor(2500);

    let report = h.tick();
    assert_eq!(report.actions.len(), 2);
    for step in [Step::LockRelay, Step::VoteRelay] {
        let failure = report.failure(step).unwrap();
        assert_eq!(failure.class, ErrorClass::Upstream);
        assert_eq!(failure.code, "SF_ERR_502");
    }
    assert!(!report.failed(Step::StakeSurplus));
}

#[test]
fn registry_write_failure_is_retried_next_tick() {
    let mut h = Harness::new();
    h.depositor(2500);
    h.engine.pool.registry_mut().set_fail_writes(true);

    let report = h.tick();
    assert_eq!(
        report.failure(Step::StakeSurplus).unwrap().code,
        "SF_ERR_500"
    );
    // The stake payment was refunded.
    assert_eq!(h.controller_balance(), Decimal::from(2500));

    h.engine.pool.registry_mut().set_fail_writes(false);
    let report = h.tick();
    assert_eq!(report.actions, vec![Action::Staked { votes: 2 }]);
    assert!(report.failures.is_empty());
}

#[test]
fn registry_drift_is_reported_not_corrected() {
    let mut h = Harness::new();
    h.engine.pool.registry_mut().force_staked(10);

    let report = h.tick();
    let failure = report.failure(Step::RegistryAudit).unwrap();
    assert_eq!(failure.code, "SF_ERR_403");
    assert_eq!(failure.class, ErrorClass::Consistency);
    assert!(report.is_noop());
    assert_eq!(h.engine.pool.registry().staked(), 10);
}

// ============================================================================
// Property: random traffic keeps ledgers consistent and always drains
// ============================================================================

#[test]
fn random_traffic_keeps_books_consistent() {
    for seed in [3_u64, 11, 99, 2024] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut h = Harness::new();
        let mut holders = Vec::new();

        for _ in 0..40 {
            match rng.gen_range(0..4) {
                0 => holders.push(h.depositor(rng.gen_range(1..5_000))),
                1 if !holders.is_empty() => {
                    let user = holders[rng.gen_range(0..holders.len())];
                    let tokens = (h.engine.claim.balance_of(&user) / Decimal::TWO).floor();
                    if tokens >= Decimal::ONE {
                        h.engine.claim.redeem(user, tokens).unwrap();
                    }
                }
                2 => h.reward(Decimal::from(rng.gen_range(1..500))),
                _ => h.engine.advance_blocks(rng.gen_range(0..DEFAULT_LOCK_PERIOD)),
            }

            let report = h.tick();
            for failure in &report.failures {
                assert_eq!(
                    failure.class,
                    ErrorClass::Insufficiency,
                    "seed {seed}: {failure:?}"
                );
            }
            let queued: Decimal = h
                .engine
                .claim
                .redeem_queue(0, usize::MAX)
                .iter()
                .map(|e| e.amount)
                .sum();
            assert_eq!(h.engine.claim.total_claimed(), queued, "seed {seed}");
            assert_eq!(h.engine.pool.pool_summary().votes, h.registry_votes());
            assert!(h.engine.claim.exchange_rate().unwrap() >= Decimal::ONE);
        }

        for _ in 0..4 {
            if h.engine.claim.redeem_len() == 0 {
                break;
            }
            h.engine.advance_blocks(DEFAULT_LOCK_PERIOD);
            h.tick();
            h.engine.advance_blocks(DEFAULT_UNLOCK_PERIOD);
            h.tick();
        }
        assert_eq!(h.engine.claim.redeem_len(), 0, "seed {seed}");
    }
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let h = Harness::new();
    let shared = SharedEngine::new(h.engine);

    let guard = shared.lock().await;
    let other = shared.clone();
    let pending = tokio::spawn(async move { other.tick().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(shared.is_ticking());

    let err = shared.tick().await.unwrap_err();
    assert!(matches!(err, StakeflowError::TickSkipped));

    drop(guard);
    let report = pending.await.unwrap().unwrap();
    assert_eq!(report.tick, 1);
    assert!(!shared.is_ticking());
    assert_eq!(shared.tick().await.unwrap().tick, 2);
}

#[tokio::test]
async fn scheduler_ticks_until_stopped() {
    let mut h = Harness::new();
    h.depositor(2500);
    let shared = SharedEngine::new(h.engine);

    let handle = shared.spawn(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(60)).await;
    let stats = handle.stop().await.unwrap();
    assert!(stats.ticks_run >= 2, "{stats:?}");
    assert_eq!(stats.step_failures, 0);

    let engine = shared.lock().await;
    assert_eq!(engine.controller().ticks(), stats.ticks_run);
    assert_eq!(
        engine.pool.user_summary(&engine.controller().account()).votes,
        2
    );
}


#[tokio::test]
async fn scheduler_uses_configured_interval() {
    let mut config = EngineConfig::default();
    config.controller.tick_interval_secs = 1;
    let h = Harness::with_config(config);
    let shared = SharedEngine::new(h.engine);
    assert_eq!(shared.tick_interval(), Duration::from_secs(1));

    // First tick fires at once, the next one is a second away.
    let handle = shared.spawn_configured();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.ticks_run, 1, "{stats:?}");
    assert_eq!(shared.lock().await.controller().ticks(), 1);
}
