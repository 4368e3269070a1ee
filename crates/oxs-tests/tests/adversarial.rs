//! Adversarial tests for the OXS protocol.
//!
//! Attack vectors covered:
//! - Over-claiming a week (double claims, weight inflation after release)
//! - Privileged operations from non-owners
//! - Administration slipped in while an engine is paused
//! - Failing payouts (frozen custody, refused legs) leaving partial state behind
//! - Liquidity bookkeeping drift under random deposit/withdraw sequences
//! - Farming payouts eating into leg reserves or protocol fees

use proptest::prelude::*;

use oxs_core::constants::SECONDS_PER_WEEK;
use oxs_core::error::{AccessError, FarmingError, StakingError, TierError};
use oxs_core::{Address, TokenLedger};
use oxs_protocol::ProtocolConfig;
use oxs_staking::ClaimWeightPolicy;
use oxs_tests::helpers::*;

// ---------------------------------------------------------------------------
// Privileged operations
// ---------------------------------------------------------------------------

#[test]
fn outsiders_cannot_administer() {
    let mut w = World::new();
    let mallory = addr("mallory");
    let not_owner = AccessError::NotOwner(mallory);

    assert_eq!(
        w.protocol.staking_mut().release_current_week(&mallory),
        Err(StakingError::Access(not_owner.clone()))
    );
    assert_eq!(
        w.protocol.staking_mut().emergency_withdraw(&mallory, 1, mallory),
        Err(StakingError::Access(not_owner.clone()))
    );
    assert_eq!(
        w.protocol.tiers_mut().add_tier(&mallory, "Whale", oxs(1_000_000), 1, 600),
        Err(TierError::Access(not_owner.clone()))
    );
    assert_eq!(
        w.protocol.farming_mut().update_protocol_fee(&mallory, 0),
        Err(FarmingError::Access(not_owner.clone()))
    );
    assert!(w.protocol.create_pool(&mallory, addr("a"), addr("b")).is_err());
    assert_eq!(
        w.protocol.farming_mut().withdraw_protocol_fees(&mallory, mallory),
        Err(FarmingError::Access(not_owner))
    );
}

#[test]
fn registering_someone_else_is_rejected() {
    let w = World::new();
    let (mallory, victim) = (addr("mallory"), addr("victim"));
    assert_eq!(
        w.protocol.staking_mut().add_eligible_claimer(&mallory, victim, oxs(1), 1, 1),
        Err(StakingError::Access(AccessError::NotAuthorized { caller: mallory, subject: victim }))
    );
    assert!(w.protocol.tiers_mut().update_user_stake(&mallory, victim, oxs(1)).is_err());
}

#[test]
fn paused_staking_blocks_claims_not_rescue() {
    let w = World::new();
    let owner = w.owner();
    let alice = addr("alice");
    w.protocol.staking_mut().add_eligible_claimer(&owner, alice, oxs(100), 1, 1).unwrap();
    w.protocol.staking_mut().release_current_week(&owner).unwrap();
    w.protocol.staking_mut().pause(&owner).unwrap();

    assert_eq!(w.protocol.staking_mut().claim(&alice, 0), Err(StakingError::Access(AccessError::Paused)));
    let treasury = addr("treasury");
    w.protocol.staking_mut().emergency_withdraw(&owner, oxs(1), treasury).unwrap();
    assert_eq!(w.ledger.balance_of(&w.token(), &treasury), oxs(1));

    w.protocol.staking_mut().unpause(&owner).unwrap();
    assert!(w.protocol.staking_mut().claim(&alice, 0).is_ok());
}

#[test]
fn paused_engines_reject_administration() {
    let mut w = World::new();
    let owner = w.owner();
    let legs = [addr("USDC"), addr("WETH")];
    let pool = w.protocol.create_pool(&owner, legs[0], legs[1]).unwrap();
    let treasury = addr("treasury");

    let farm_paused = FarmingError::Access(AccessError::Paused);
    let farming = w.protocol.farming_mut();
    farming.pause(&owner).unwrap();
    assert_eq!(farming.update_pool_apy(&owner, pool, 5_000), Err(farm_paused.clone()));
    assert_eq!(farming.update_pool_multiplier(&owner, pool, 5_000), Err(farm_paused.clone()));
    assert_eq!(farming.pause_pool(&owner, pool), Err(farm_paused.clone()));
    assert_eq!(farming.unpause_pool(&owner, pool), Err(farm_paused.clone()));
    assert_eq!(farming.update_protocol_fee(&owner, 2_000), Err(farm_paused.clone()));
    assert_eq!(farming.withdraw_protocol_fees(&owner, treasury), Err(farm_paused.clone()));
    assert_eq!(farming.collect_pool_fees(&owner, pool, treasury), Err(farm_paused.clone()));
    assert_eq!(farming.transfer_ownership(&owner, treasury), Err(farm_paused));
    assert_eq!(farming.protocol_fee_bps(), 0);
    assert!(farming.is_pool_active(pool));
    assert!(w.protocol.create_pool(&owner, addr("DAI"), legs[1]).is_err());

    let tier_paused = TierError::Access(AccessError::Paused);
    let mut tiers = w.protocol.tiers_mut();
    tiers.pause(&owner).unwrap();
    let count = tiers.tier_count();
    assert_eq!(tiers.add_tier(&owner, "Whale", oxs(1_000_000), 1, 600), Err(tier_paused.clone()));
    assert_eq!(tiers.update_tier(&owner, 1, "Bronze", oxs(1), 1, 600), Err(tier_paused.clone()));
    assert_eq!(tiers.set_tier_active(&owner, 1, false), Err(tier_paused.clone()));
    assert_eq!(tiers.set_max_tiers(&owner, 20), Err(tier_paused));
    assert_eq!(tiers.tier_count(), count);
    assert!(tiers.tier_info(1).unwrap().active);
}

#[test]
fn paused_tiers_still_allow_emergency_unstake() {
    let w = World::new();
    let owner = w.owner();
    let alice = addr("alice");
    let stake = oxs(34_000);
    let tier = w.stake_tier(&alice, stake);
    assert!(tier > 0);
    w.protocol.tiers_mut().pause(&owner).unwrap();

    assert!(w.protocol.tiers_mut().update_user_stake(&alice, alice, 0).is_err());
    assert_eq!(w.protocol.tiers_mut().emergency_unstake(&alice).unwrap(), stake);
    assert_eq!(w.ledger.balance_of(&w.token(), &alice), stake);
    assert_eq!(w.protocol.tiers().user_tier(&alice), 0);
    assert_eq!(w.protocol.tiers().total_staked(), 0);
    assert_eq!(w.protocol.tiers_mut().emergency_unstake(&alice), Err(TierError::NothingStaked(alice)));
}

// ---------------------------------------------------------------------------
// Failing payouts
// ---------------------------------------------------------------------------

#[test]
fn frozen_custody_claim_can_be_retried() {
    let w = World::new();
    let owner = w.owner();
    let alice = addr("alice");
    w.protocol.staking_mut().add_eligible_claimer(&owner, alice, oxs(100), 1, 1).unwrap();
    let released = w.protocol.staking_mut().release_current_week(&owner).unwrap();

    w.ledger.freeze(&w.accounts.staking_custody);
    assert!(matches!(w.protocol.staking_mut().claim(&alice, 0), Err(StakingError::Transfer(_))));
    assert!(!w.protocol.staking().has_claimed(&alice, 0).unwrap());
    assert_eq!(w.protocol.staking().distribution(0).unwrap().claimed_amount, 0);

    w.ledger.unfreeze(&w.accounts.staking_custody);
    assert_eq!(w.protocol.staking_mut().claim(&alice, 0).unwrap(), released);
    assert_eq!(
        w.protocol.staking_mut().claim(&alice, 0),
        Err(StakingError::AlreadyClaimed { participant: alice, week: 0 })
    );
}

#[test]
fn frozen_custody_withdraw_restores_position() {
    let mut w = World::new();
    let owner = w.owner();
    let legs = [addr("USDC"), addr("WETH")];
    let pool = w.protocol.create_pool(&owner, legs[0], legs[1]).unwrap();
    let alice = addr("alice");
    w.fund_legs(&alice, legs, oxs(1_000));
    w.protocol.farming_mut().deposit_liquidity(&alice, pool, oxs(1_000), oxs(1_000)).unwrap();
    w.advance_weeks(2);

    let pool_before = w.protocol.farming().pool(pool).unwrap().clone();
    w.ledger.freeze(&w.accounts.farming_custody);
    assert!(w.protocol.farming_mut().withdraw_liquidity(&alice, pool, oxs(500)).is_err());
    assert_eq!(w.protocol.farming().pool(pool).unwrap(), &pool_before);
    assert_eq!(w.protocol.farming().position(&alice, pool).unwrap().liquidity, oxs(2_000));
    assert_eq!(w.protocol.farming().protocol_stats().total_rewards_distributed, 0);

    w.ledger.unfreeze(&w.accounts.farming_custody);
    assert!(w.protocol.farming_mut().withdraw_liquidity(&alice, pool, oxs(500)).is_ok());
}

#[test]
fn refused_leg_leaves_withdrawal_untouched() {
    let mut w = World::new();
    let owner = w.owner();
    let legs = [addr("USDC"), addr("WETH")];
    let pool = w.protocol.create_pool(&owner, legs[0], legs[1]).unwrap();
    let (alice, bob) = (addr("alice"), addr("bob"));
    for user in [alice, bob] {
        w.fund_legs(&user, legs, oxs(1_000));
        w.protocol.farming_mut().deposit_liquidity(&user, pool, oxs(1_000), oxs(1_000)).unwrap();
    }
    w.advance_weeks(3);
    let custody = w.accounts.farming_custody;
    let pool_before = w.protocol.farming().pool(pool).unwrap().clone();
    let position_before = w.protocol.farming().position(&alice, pool).unwrap().clone();

    // Only the second leg refuses; the first must not leave custody alone.
    w.ledger.freeze_token(&legs[1]);
    assert!(w.protocol.farming_mut().withdraw_liquidity(&alice, pool, oxs(2_000)).is_err());
    assert!(w.protocol.farming_mut().emergency_withdraw(&alice, pool).is_err());
    assert_eq!(w.protocol.farming().pool(pool).unwrap(), &pool_before);
    assert_eq!(w.protocol.farming().position(&alice, pool).unwrap(), &position_before);
    assert_eq!(w.ledger.balance_of(&legs[0], &alice), 0);
    assert_eq!(w.ledger.balance_of(&legs[0], &custody), oxs(2_000));
    assert_eq!(w.protocol.farming().owed_balance(&alice, &legs[0]), 0);

    // Once the leg moves again, alice exits exactly once.
    w.ledger.unfreeze_token(&legs[1]);
    assert_eq!(w.protocol.farming_mut().emergency_withdraw(&alice, pool).unwrap(), (oxs(1_000), oxs(1_000)));
    assert!(w.protocol.farming_mut().emergency_withdraw(&alice, pool).is_err());
    assert_eq!(w.ledger.balance_of(&legs[0], &custody), oxs(1_000));
    assert_eq!(w.protocol.farming().pool(pool).unwrap().reserve_a, oxs(1_000));
}

#[test]
fn farming_rewards_never_spend_leg_reserves() {
    // A pool whose leg is the reward token itself.
    let mut w = World::new();
    let owner = w.owner();
    let oxs_token = w.token();
    let pool = w.protocol.create_pool(&owner, oxs_token, addr("USDC")).unwrap();
    let alice = addr("alice");
    w.fund_legs(&alice, [oxs_token, addr("USDC")], oxs(1_000));
    w.protocol.farming_mut().deposit_liquidity(&alice, pool, oxs(1_000), oxs(1_000)).unwrap();

    // Drain the reward budget, leaving only alice's OXS leg in custody.
    let drain = addr("drain");
    w.ledger.transfer(&oxs_token, &w.accounts.farming_custody, &drain, FARMING_BUDGET).unwrap();
    w.advance_weeks(10);
    assert!(matches!(
        w.protocol.farming_mut().claim_rewards(&alice, pool),
        Err(FarmingError::Transfer(_))
    ));
    // Emergency exit still returns the full leg.
    assert_eq!(w.protocol.farming_mut().emergency_withdraw(&alice, pool).unwrap(), (oxs(1_000), oxs(1_000)));
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

fn participants(n: usize) -> Vec<Address> {
    (0..n).map(|i| addr(&format!("participant-{i}"))).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Claims for a week never exceed its release, whatever happens to the
    /// weights between release and claim.
    #[test]
    fn claims_bounded_by_release(
        stakes in prop::collection::vec((1u128..1_000_000, 0u32..150, 0u32..200), 1..8),
        inflate in prop::collection::vec(1u128..10_000_000, 1..8),
        current_policy in any::<bool>(),
    ) {
        let mut config = ProtocolConfig::default();
        if current_policy {
            config.staking.claim_weight_policy = ClaimWeightPolicy::Current;
        }
        let w = World::with_config(&config);
        let owner = w.owner();
        let people = participants(stakes.len());
        for (who, (amount, p, l)) in people.iter().zip(&stakes) {
            w.protocol.staking_mut().add_eligible_claimer(&owner, *who, oxs(*amount), *p, *l).unwrap();
        }
        let released = w.protocol.staking_mut().release_current_week(&owner).unwrap();
        for (who, amount) in people.iter().zip(&inflate) {
            w.protocol.staking_mut().update_user_metrics(who, *who, oxs(*amount), 100, 104).unwrap();
        }

        let mut paid = 0u128;
        for who in &people {
            match w.protocol.staking_mut().claim(who, 0) {
                Ok(amount) => paid += amount,
                Err(StakingError::NothingToClaim) => {}
                Err(e) => return Err(TestCaseError::fail(format!("unexpected {e}"))),
            }
            prop_assert!(w.protocol.staking_mut().claim(who, 0).is_err());
        }
        prop_assert!(paid <= released);
        prop_assert_eq!(w.protocol.staking().distribution(0).unwrap().claimed_amount, paid);
    }

    /// Pool totals stay equal to the sum of positions, and custody always
    /// holds every leg reserve and retained fee.
    #[test]
    fn liquidity_bookkeeping_consistent(
        ops in prop::collection::vec((0usize..3, any::<bool>(), 1u128..5_000, 0u64..4), 1..30),
    ) {
        let mut w = World::new();
        let owner = w.owner();
        let legs = [addr("USDC"), addr("WETH")];
        let pool = w.protocol.create_pool(&owner, legs[0], legs[1]).unwrap();
        let people = participants(3);
        for who in &people {
            w.fund_legs(who, legs, oxs(1_000_000));
        }

        for (idx, deposit, amount, weeks) in ops {
            let who = people[idx];
            if deposit {
                w.protocol.farming_mut().deposit_liquidity(&who, pool, oxs(amount), oxs(amount) / 2 + 1_000).unwrap();
            } else if let Some(pos) = w.protocol.farming().position(&who, pool).cloned() {
                if pos.active {
                    let take = oxs(amount).min(pos.liquidity);
                    w.protocol.farming_mut().withdraw_liquidity(&who, pool, take).unwrap();
                }
            }
            w.clock.advance(weeks * SECONDS_PER_WEEK);

            let farming = w.protocol.farming();
            let p = farming.pool(pool).unwrap();
            let positions: Vec<_> = people.iter().filter_map(|u| farming.position(u, pool)).collect();
            let total: u128 = positions.iter().map(|x| x.liquidity).sum();
            let sum_a: u128 = positions.iter().map(|x| x.amount_a).sum();
            prop_assert_eq!(p.total_liquidity, total);
            prop_assert_eq!(p.reserve_a, sum_a);
            for x in &positions {
                prop_assert_eq!(x.amount_a + x.amount_b, x.liquidity);
                prop_assert_eq!(x.active, x.liquidity > 0);
            }
            let custody = w.accounts.farming_custody;
            prop_assert_eq!(w.ledger.balance_of(&legs[0], &custody), p.reserve_a + p.fee_reserve_a);
            prop_assert_eq!(w.ledger.balance_of(&legs[1], &custody), p.reserve_b + p.fee_reserve_b);
        }
    }

    /// Reward payouts plus protocol fees never exceed what left the budget.
    #[test]
    fn reward_accounting_matches_ledger(
        fee_bps in 0u128..=2_000,
        weeks in prop::collection::vec(1u64..20, 1..6),
    ) {
        let mut w = World::new();
        let owner = w.owner();
        w.protocol.farming_mut().update_protocol_fee(&owner, fee_bps).unwrap();
        let legs = [addr("USDC"), addr("WETH")];
        let pool = w.protocol.create_pool(&owner, legs[0], legs[1]).unwrap();
        let alice = addr("alice");
        w.fund_legs(&alice, legs, oxs(10_000));
        w.protocol.farming_mut().deposit_liquidity(&alice, pool, oxs(10_000), oxs(10_000)).unwrap();

        for step in weeks {
            w.advance_weeks(step);
            w.protocol.farming_mut().claim_rewards(&alice, pool).unwrap();
        }
        let stats = w.protocol.farming().protocol_stats();
        let custody_left = w.ledger.balance_of(&w.token(), &w.accounts.farming_custody);
        prop_assert_eq!(w.ledger.balance_of(&w.token(), &alice), stats.total_rewards_distributed);
        prop_assert_eq!(custody_left + stats.total_rewards_distributed, FARMING_BUDGET);
        prop_assert!(custody_left >= stats.protocol_fees);
    }
}
