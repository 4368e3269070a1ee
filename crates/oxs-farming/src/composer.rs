//! Reward composition and exit fee decay.
//!
//! Multipliers use the 1_000 = 1.0x scale; APY, bonuses and fees use basis
//! points (10_000 = 100%).
//!
//! ```text
//! base     = liquidity * apy_bps * elapsed / (10_000 * YEAR)
//! combined = min(tier * staking / 1_000, max_multiplier)
//! time     = 1_000 + time_bonus_bps * 1_000 / 10_000
//! reward   = base * combined / 1_000 * time / 1_000
//! ```

use serde::{Deserialize, Serialize};

use oxs_core::TierId;
use oxs_core::constants::{
    BPS_PRECISION, MULTIPLIER_PRECISION, SECONDS_PER_WEEK, SECONDS_PER_YEAR, STAKING_BONUS_ACTIVE,
    TIER_MULTIPLIER_STEP,
};
use oxs_core::error::MathError;
use oxs_core::math::{apply_multiplier, mul_div};
use oxs_tier::conversion_rate_at;

/// Multipliers applied to one participant in one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multipliers {
    pub tier_multiplier: u128,
    pub staking_bonus: u128,
    /// Time bonus in basis points from the progression curve.
    pub time_bonus: u128,
    /// `tier * staking`, capped at the pool's max multiplier.
    pub combined: u128,
    /// `1.0x + time_bonus`.
    pub time_multiplier: u128,
}

/// Full reward computation for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub base_reward: u128,
    pub multipliers: Multipliers,
    /// Reward for the period since the last accrual.
    pub period_reward: u128,
    /// Reward accrued earlier and not yet paid.
    pub accrued: u128,
    pub final_reward: u128,
}

pub fn tier_multiplier(tier: TierId) -> u128 {
    MULTIPLIER_PRECISION + TIER_MULTIPLIER_STEP * tier as u128
}

pub fn staking_bonus(active: bool) -> u128 {
    if active { STAKING_BONUS_ACTIVE } else { MULTIPLIER_PRECISION }
}

/// Time bonus in basis points after `weeks` in a pool. 600 at week 0,
/// 10_000 from week 104.
pub fn exponential_time_bonus(weeks: u32) -> u128 {
    conversion_rate_at(weeks) as u128
}

pub fn time_multiplier(time_bonus_bps: u128) -> u128 {
    MULTIPLIER_PRECISION + time_bonus_bps * MULTIPLIER_PRECISION / BPS_PRECISION
}

/// Whole weeks between `start` and `now`.
pub fn weeks_between(start: u64, now: u64) -> u32 {
    u32::try_from(now.saturating_sub(start) / SECONDS_PER_WEEK).unwrap_or(u32::MAX)
}

pub fn compose_multipliers(tier: TierId, staking_active: bool, age_weeks: u32, max_multiplier: u128) -> Multipliers {
    let tier_multiplier = tier_multiplier(tier);
    let staking_bonus = staking_bonus(staking_active);
    let combined = (tier_multiplier * staking_bonus / MULTIPLIER_PRECISION).min(max_multiplier);
    let time_bonus = exponential_time_bonus(age_weeks);
    Multipliers {
        tier_multiplier,
        staking_bonus,
        time_bonus,
        combined,
        time_multiplier: time_multiplier(time_bonus),
    }
}

/// APY accrual on `liquidity` over `elapsed_secs`, before multipliers.
pub fn base_reward(liquidity: u128, apy_bps: u128, elapsed_secs: u64) -> Result<u128, MathError> {
    let scaled = liquidity.checked_mul(apy_bps).ok_or(MathError::Overflow)?;
    mul_div(scaled, elapsed_secs as u128, BPS_PRECISION * SECONDS_PER_YEAR as u128)
}

/// Apply the combined and time multipliers to a base reward.
pub fn apply_multipliers(base: u128, m: &Multipliers) -> Result<u128, MathError> {
    apply_multiplier(apply_multiplier(base, m.combined)?, m.time_multiplier)
}

/// Exit fee in basis points, decaying linearly from `fee_initial` at the
/// position start to `fee_final` after `vesting_weeks`.
pub fn dynamic_fee(fee_initial: u128, fee_final: u128, vesting_weeks: u32, elapsed_secs: u64) -> u128 {
    let vesting_secs = vesting_weeks as u128 * SECONDS_PER_WEEK as u128;
    let elapsed = elapsed_secs as u128;
    if vesting_secs == 0 || elapsed >= vesting_secs || fee_initial <= fee_final {
        return fee_final;
    }
    // (initial - final) <= 10_000 and elapsed < vesting_secs, no overflow.
    fee_initial - (fee_initial - fee_final) * elapsed / vesting_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxs_core::constants::ONE_OXS;
    use proptest::prelude::*;

    #[test]
    fn baseline_multipliers() {
        let m = compose_multipliers(0, false, 0, 3_000);
        assert_eq!(m.tier_multiplier, 1_000);
        assert_eq!(m.staking_bonus, 1_000);
        assert_eq!(m.time_bonus, 600);
        assert_eq!(m.combined, 1_000);
        assert_eq!(m.time_multiplier, 1_060);
    }

    #[test]
    fn tier_and_staking_compose() {
        let m = compose_multipliers(2, true, 0, 3_000);
        assert_eq!(m.tier_multiplier, 1_500);
        assert_eq!(m.staking_bonus, 1_200);
        assert_eq!(m.combined, 1_800);
    }

    #[test]
    fn combined_is_capped() {
        let m = compose_multipliers(10, true, 0, 2_000);
        assert_eq!(m.combined, 2_000);
    }

    #[test]
    fn time_bonus_points() {
        assert_eq!(exponential_time_bonus(0), 600);
        assert_eq!(exponential_time_bonus(26), 1_900);
        assert_eq!(exponential_time_bonus(104), 10_000);
        assert_eq!(time_multiplier(10_000), 2_000);
    }

    #[test]
    fn one_year_at_ten_percent() {
        let liquidity = 1_000 * ONE_OXS;
        assert_eq!(base_reward(liquidity, 1_000, SECONDS_PER_YEAR).unwrap(), 100 * ONE_OXS);
        assert_eq!(base_reward(liquidity, 1_000, 0).unwrap(), 0);
    }

    #[test]
    fn reward_applies_both_multipliers() {
        let m = compose_multipliers(0, false, 0, 3_000);
        // 100 * 1.0 * 1.06
        assert_eq!(apply_multipliers(100 * ONE_OXS, &m).unwrap(), 106 * ONE_OXS);
    }

    #[test]
    fn fee_endpoints() {
        assert_eq!(dynamic_fee(500, 50, 52, 0), 500);
        assert_eq!(dynamic_fee(500, 50, 52, 26 * SECONDS_PER_WEEK), 275);
        assert_eq!(dynamic_fee(500, 50, 52, 52 * SECONDS_PER_WEEK), 50);
        assert_eq!(dynamic_fee(500, 50, 52, u64::MAX), 50);
        assert_eq!(dynamic_fee(500, 50, 0, 0), 50);
    }

    #[test]
    fn weeks_between_saturates() {
        assert_eq!(weeks_between(100, 50), 0);
        assert_eq!(weeks_between(0, 3 * SECONDS_PER_WEEK + 1), 3);
    }

    proptest! {
        #[test]
        fn fee_non_increasing_and_bounded(
            initial in 0u128..=10_000,
            final_fee in 0u128..=10_000,
            vesting in 0u32..=208,
            t1 in 0u64..(300 * SECONDS_PER_WEEK),
            dt in 0u64..(300 * SECONDS_PER_WEEK),
        ) {
            prop_assume!(initial >= final_fee);
            let f1 = dynamic_fee(initial, final_fee, vesting, t1);
            let f2 = dynamic_fee(initial, final_fee, vesting, t1 + dt);
            prop_assert!(f2 <= f1);
            prop_assert!(f1 <= initial && f1 >= final_fee);
            prop_assert!(f2 >= final_fee);
        }

        #[test]
        fn multipliers_monotonic_in_tier(tier in 0u8..10, weeks in 0u32..200) {
            let lo = compose_multipliers(tier, false, weeks, u128::MAX);
            let hi = compose_multipliers(tier + 1, false, weeks, u128::MAX);
            prop_assert!(hi.combined > lo.combined);
        }

        #[test]
        fn time_bonus_non_decreasing(w in 0u32..300) {
            prop_assert!(exponential_time_bonus(w + 1) >= exponential_time_bonus(w));
        }
    }
}
