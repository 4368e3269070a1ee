//! Farming engine: pool administration and user liquidity operations.
//!
//! Leg tokens and reward tokens are held by one custody address. Rewards are
//! accrued into the position before any liquidity change so that a change
//! only affects time after it. Every payout follows the same shape: compute,
//! dry-run each transfer, commit state, transfer, restore state if nothing
//! moved. When a multi-leg payout stops after its first leg, the state stays
//! committed and the unpaid legs become an owed balance of the recipient.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use oxs_core::access::ensure_valid_address;
use oxs_core::constants::{MAX_POOLS_PER_USER, MAX_PROTOCOL_FEE_BPS, MIN_DEPOSIT_AMOUNT};
use oxs_core::error::{FarmingError, MathError, TransferError};
use oxs_core::math::{apply_bps, mul_div};
use oxs_core::{AccessControl, Address, Clock, StakingActivity, TierId, TierSource, TokenId, TokenLedger};

use crate::composer::{
    Multipliers, RewardBreakdown, apply_multipliers, base_reward, compose_multipliers, dynamic_fee,
    exponential_time_bonus, weeks_between,
};
use crate::pool::{Pool, PoolId, PoolLedger, PoolParams, UserPosition, check_multiplier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmingConfig {
    /// Share of claimed rewards kept as protocol revenue.
    pub protocol_fee_bps: u32,
    /// Smallest accepted amount per leg, in base units.
    pub min_deposit: u64,
    pub max_pools_per_user: usize,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            protocol_fee_bps: 0,
            min_deposit: MIN_DEPOSIT_AMOUNT as u64,
            max_pools_per_user: MAX_POOLS_PER_USER,
        }
    }
}

impl FarmingConfig {
    pub fn validate(&self) -> Result<(), FarmingError> {
        check_protocol_fee(self.protocol_fee_bps as u128)
    }
}

fn check_protocol_fee(fee: u128) -> Result<(), FarmingError> {
    if fee > MAX_PROTOCOL_FEE_BPS {
        return Err(FarmingError::FeeTooHigh { fee, max: MAX_PROTOCOL_FEE_BPS });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub total_pools: usize,
    pub active_pools: usize,
    pub total_value_locked: u128,
    pub total_rewards_distributed: u128,
    /// Protocol fees held in custody and not yet withdrawn.
    pub protocol_fees: u128,
}

/// What a withdrawal paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub liquidity: u128,
    pub amount_a: u128,
    pub amount_b: u128,
    pub fee_bps: u128,
    pub fee_a: u128,
    pub fee_b: u128,
    pub reward: u128,
    pub protocol_fee: u128,
}

pub struct FarmingEngine {
    access: AccessControl,
    pools: PoolLedger,
    protocol_fee_bps: u128,
    min_deposit: u128,
    max_pools_per_user: usize,
    reward_token: TokenId,
    custody: Address,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    tier_source: Option<Arc<dyn TierSource>>,
    staking_source: Option<Arc<dyn StakingActivity>>,
    total_rewards_distributed: u128,
    protocol_fees: u128,
    /// Amounts custody still has to send after an interrupted payout.
    owed: BTreeMap<(Address, TokenId), u128>,
    last_seen: u64,
}

/// How a multi-leg payout failed.
enum PayoutFailure {
    /// Nothing left custody.
    Untouched(TransferError),
    /// Some legs were paid; the rest were credited as owed.
    Deferred(TransferError),
}

impl FarmingEngine {
    pub fn new(
        config: &FarmingConfig,
        owner: Address,
        reward_token: TokenId,
        custody: Address,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FarmingError> {
        config.validate()?;
        ensure_valid_address(&reward_token)?;
        ensure_valid_address(&custody)?;
        let access = AccessControl::new(owner)?;
        let last_seen = clock.now();
        info!(%owner, %custody, protocol_fee_bps = config.protocol_fee_bps, "farming engine initialised");
        Ok(Self {
            access,
            pools: PoolLedger::new(),
            protocol_fee_bps: config.protocol_fee_bps as u128,
            min_deposit: config.min_deposit as u128,
            max_pools_per_user: config.max_pools_per_user,
            reward_token,
            custody,
            ledger,
            clock,
            tier_source: None,
            staking_source: None,
            total_rewards_distributed: 0,
            protocol_fees: 0,
            owed: BTreeMap::new(),
            last_seen,
        })
    }

    /// Read tiers from `source`. Without one every participant has tier 0.
    pub fn with_tier_source(mut self, source: Arc<dyn TierSource>) -> Self {
        self.tier_source = Some(source);
        self
    }

    /// Read staking activity from `source`. Without one nobody is staking.
    pub fn with_staking_source(mut self, source: Arc<dyn StakingActivity>) -> Self {
        self.staking_source = Some(source);
        self
    }

    fn now(&mut self) -> u64 {
        self.last_seen = self.peek_now();
        self.last_seen
    }

    fn peek_now(&self) -> u64 {
        self.clock.now().max(self.last_seen)
    }

    // ------------------------------------------------------------------
    // Reward math against live state
    // ------------------------------------------------------------------

    pub fn user_tier(&self, user: &Address) -> TierId {
        self.tier_source.as_ref().map_or(0, |s| s.tier_of_user(user))
    }

    pub fn user_has_active_staking(&self, user: &Address) -> bool {
        self.staking_source
            .as_ref()
            .is_some_and(|s| s.has_active_staking(user))
    }

    fn multipliers_for(&self, user: &Address, pool: &Pool, position_start: u64, now: u64) -> Multipliers {
        compose_multipliers(
            self.user_tier(user),
            self.user_has_active_staking(user),
            weeks_between(position_start, now),
            pool.params.max_multiplier,
        )
    }

    fn breakdown(&self, user: &Address, pool: &Pool, position: &UserPosition, now: u64) -> Result<RewardBreakdown, FarmingError> {
        let multipliers = self.multipliers_for(user, pool, position.position_start, now);
        let (base_reward, period_reward) = if position.active {
            let elapsed = now.saturating_sub(position.last_accrual);
            let base = base_reward(position.liquidity, pool.params.base_apy_bps, elapsed)?;
            (base, apply_multipliers(base, &multipliers)?)
        } else {
            (0, 0)
        };
        let final_reward = position
            .accrued_rewards
            .checked_add(period_reward)
            .ok_or(MathError::Overflow)?;
        Ok(RewardBreakdown {
            base_reward,
            multipliers,
            period_reward,
            accrued: position.accrued_rewards,
            final_reward,
        })
    }

    /// Fold rewards up to `now` into the position.
    fn accrue(&self, user: &Address, pool: &Pool, position: &mut UserPosition, now: u64) -> Result<(), FarmingError> {
        let b = self.breakdown(user, pool, position, now)?;
        if b.period_reward > 0 {
            debug!(%user, pool = pool.id, base = b.base_reward, reward = b.period_reward, "accrued");
        }
        position.accrued_rewards = b.final_reward;
        position.last_accrual = now;
        Ok(())
    }

    /// Reward tokens in custody that are not owed as pool legs, exit fees,
    /// protocol fees or interrupted payouts.
    pub fn reward_budget(&self) -> u128 {
        let owed_payouts = self
            .owed
            .iter()
            .filter(|((_, token), _)| *token == self.reward_token)
            .fold(self.protocol_fees, |acc, (_, amount)| acc.saturating_add(*amount));
        let owed: u128 = self
            .pools
            .pools()
            .map(|p| {
                let mut owed = 0u128;
                if p.token_a == self.reward_token {
                    owed = owed.saturating_add(p.reserve_a).saturating_add(p.fee_reserve_a);
                }
                if p.token_b == self.reward_token {
                    owed = owed.saturating_add(p.reserve_b).saturating_add(p.fee_reserve_b);
                }
                owed
            })
            .fold(owed_payouts, u128::saturating_add);
        self.ledger
            .balance_of(&self.reward_token, &self.custody)
            .saturating_sub(owed)
    }

    fn ensure_reward_budget(&self, reward: u128) -> Result<(), FarmingError> {
        let have = self.reward_budget();
        if have < reward {
            warn!(have, need = reward, "reward budget exhausted");
            return Err(TransferError::InsufficientBalance { have, need: reward }.into());
        }
        Ok(())
    }

    /// Custody must hold every outgoing amount, summed per token.
    fn ensure_custody_covers(&self, payouts: &[(TokenId, u128)]) -> Result<(), FarmingError> {
        let mut per_token: BTreeMap<TokenId, u128> = BTreeMap::new();
        for (token, amount) in payouts {
            let entry = per_token.entry(*token).or_insert(0);
            *entry = entry.checked_add(*amount).ok_or(MathError::Overflow)?;
        }
        for (token, need) in per_token {
            let have = self.ledger.balance_of(&token, &self.custody);
            if have < need {
                return Err(TransferError::InsufficientBalance { have, need }.into());
            }
        }
        Ok(())
    }

    /// Dry-run every outgoing leg before any state is committed.
    fn preflight(&self, to: &Address, payouts: &[(TokenId, u128)]) -> Result<(), FarmingError> {
        self.ensure_custody_covers(payouts)?;
        for (token, amount) in payouts.iter().filter(|(_, a)| *a > 0) {
            self.ledger.check_transfer(token, &self.custody, to, *amount)?;
        }
        Ok(())
    }

    fn credit_owed(&mut self, to: Address, token: TokenId, amount: u128) {
        let entry = self.owed.entry((to, token)).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Send `payouts` in order. Legs after a failure that follows a
    /// successful leg are credited to `to` as owed.
    fn pay_out(&mut self, to: &Address, payouts: &[(TokenId, u128)]) -> Result<(), PayoutFailure> {
        let legs: Vec<(TokenId, u128)> = payouts.iter().copied().filter(|(_, a)| *a > 0).collect();
        for (i, (token, amount)) in legs.iter().enumerate() {
            if let Err(cause) = self.ledger.transfer(token, &self.custody, to, *amount) {
                if i == 0 {
                    return Err(PayoutFailure::Untouched(cause));
                }
                for (token, amount) in &legs[i..] {
                    self.credit_owed(*to, *token, *amount);
                }
                warn!(recipient = %to, paid_legs = i, unpaid_legs = legs.len() - i, error = %cause, "payout interrupted, remainder owed");
                return Err(PayoutFailure::Deferred(cause));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pool administration (owner)
    // ------------------------------------------------------------------

    pub fn create_pool(
        &mut self,
        caller: &Address,
        token_a: TokenId,
        token_b: TokenId,
        params: PoolParams,
    ) -> Result<PoolId, FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        if token_a.is_zero() || token_b.is_zero() {
            return Err(FarmingError::InvalidToken);
        }
        if token_a == token_b {
            return Err(FarmingError::IdenticalTokens);
        }
        params.validate()?;
        let now = self.now();
        let id = self.pools.create(token_a, token_b, params, now);
        info!(pool = id, %token_a, %token_b, apy = params.base_apy_bps, "pool created");
        Ok(id)
    }

    pub fn update_pool_apy(&mut self, caller: &Address, pool_id: PoolId, base_apy_bps: u128) -> Result<(), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        self.pools.pool_mut(pool_id)?.params.base_apy_bps = base_apy_bps;
        info!(pool = pool_id, base_apy_bps, "pool APY updated");
        Ok(())
    }

    pub fn update_pool_multiplier(
        &mut self,
        caller: &Address,
        pool_id: PoolId,
        max_multiplier: u128,
    ) -> Result<(), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        check_multiplier(max_multiplier)?;
        self.pools.pool_mut(pool_id)?.params.max_multiplier = max_multiplier;
        info!(pool = pool_id, max_multiplier, "pool multiplier updated");
        Ok(())
    }

    pub fn pause_pool(&mut self, caller: &Address, pool_id: PoolId) -> Result<(), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        let pool = self.pools.pool_mut(pool_id)?;
        if !pool.active {
            return Err(FarmingError::PoolInactive(pool_id));
        }
        pool.active = false;
        info!(pool = pool_id, "pool paused");
        Ok(())
    }

    pub fn unpause_pool(&mut self, caller: &Address, pool_id: PoolId) -> Result<(), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        self.pools.pool_mut(pool_id)?.active = true;
        info!(pool = pool_id, "pool unpaused");
        Ok(())
    }

    pub fn update_protocol_fee(&mut self, caller: &Address, fee_bps: u128) -> Result<(), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        check_protocol_fee(fee_bps)?;
        self.protocol_fee_bps = fee_bps;
        info!(fee_bps, "protocol fee updated");
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), FarmingError> {
        Ok(self.access.pause(caller)?)
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), FarmingError> {
        Ok(self.access.unpause(caller)?)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), FarmingError> {
        Ok(self.access.transfer_ownership(caller, new_owner)?)
    }

    /// Owner-only. Send accumulated protocol fees to `recipient`.
    pub fn withdraw_protocol_fees(&mut self, caller: &Address, recipient: Address) -> Result<u128, FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        ensure_valid_address(&recipient)?;
        let amount = self.protocol_fees;
        if amount == 0 {
            return Err(FarmingError::NothingToClaim);
        }
        self.protocol_fees = 0;
        if let Err(e) = self.ledger.transfer(&self.reward_token, &self.custody, &recipient, amount) {
            self.protocol_fees = amount;
            return Err(e.into());
        }
        info!(%recipient, amount, "protocol fees withdrawn");
        Ok(amount)
    }

    /// Owner-only. Send a pool's retained exit fees to `recipient`.
    pub fn collect_pool_fees(
        &mut self,
        caller: &Address,
        pool_id: PoolId,
        recipient: Address,
    ) -> Result<(u128, u128), FarmingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        ensure_valid_address(&recipient)?;
        let before = self.pools.pool(pool_id)?.clone();
        let (fee_a, fee_b) = (before.fee_reserve_a, before.fee_reserve_b);
        if fee_a == 0 && fee_b == 0 {
            return Err(FarmingError::NothingToClaim);
        }
        let payouts = [(before.token_a, fee_a), (before.token_b, fee_b)];
        self.preflight(&recipient, &payouts)?;

        let mut pool = before.clone();
        pool.fee_reserve_a = 0;
        pool.fee_reserve_b = 0;
        self.pools.set_pool(pool);
        match self.pay_out(&recipient, &payouts) {
            Ok(()) => {}
            Err(PayoutFailure::Untouched(e)) => {
                self.pools.set_pool(before);
                return Err(e.into());
            }
            Err(PayoutFailure::Deferred(cause)) => return Err(FarmingError::PayoutDeferred { recipient, cause }),
        }
        info!(pool = pool_id, %recipient, fee_a, fee_b, "pool fees collected");
        Ok((fee_a, fee_b))
    }

    // ------------------------------------------------------------------
    // User operations
    // ------------------------------------------------------------------

    /// Deposit both legs into `pool_id`. Returns the position's liquidity.
    ///
    /// Legs are pulled against allowances granted to the custody address.
    pub fn deposit_liquidity(
        &mut self,
        caller: &Address,
        pool_id: PoolId,
        amount_a: u128,
        amount_b: u128,
    ) -> Result<u128, FarmingError> {
        self.access.ensure_not_paused()?;
        ensure_valid_address(caller)?;
        let mut pool = self.pools.active_pool(pool_id)?.clone();
        if amount_a < self.min_deposit || amount_b < self.min_deposit {
            return Err(FarmingError::BelowMinimumDeposit { min: self.min_deposit });
        }
        let previous = self.pools.position(caller, pool_id).cloned().unwrap_or_default();
        if !previous.active && self.pools.active_pools_of(caller) >= self.max_pools_per_user {
            return Err(FarmingError::TooManyPools { max: self.max_pools_per_user });
        }

        let now = self.now();
        let mut position = previous;
        if position.active {
            self.accrue(caller, &pool, &mut position, now)?;
        } else {
            // Re-activation starts a fresh position; lifetime claims and any
            // unpaid rewards carry over.
            position = UserPosition {
                position_start: now,
                last_claim: now,
                last_accrual: now,
                accrued_rewards: position.accrued_rewards,
                claimed_rewards: position.claimed_rewards,
                active: true,
                ..Default::default()
            };
        }
        let added = amount_a.checked_add(amount_b).ok_or(MathError::Overflow)?;
        position.liquidity = position.liquidity.checked_add(added).ok_or(MathError::Overflow)?;
        position.amount_a = position.amount_a.checked_add(amount_a).ok_or(MathError::Overflow)?;
        position.amount_b = position.amount_b.checked_add(amount_b).ok_or(MathError::Overflow)?;
        pool.total_liquidity = pool.total_liquidity.checked_add(added).ok_or(MathError::Overflow)?;
        pool.reserve_a = pool.reserve_a.checked_add(amount_a).ok_or(MathError::Overflow)?;
        pool.reserve_b = pool.reserve_b.checked_add(amount_b).ok_or(MathError::Overflow)?;

        self.ledger
            .check_transfer_from(&pool.token_a, &self.custody, caller, &self.custody, amount_a)?;
        self.ledger
            .check_transfer_from(&pool.token_b, &self.custody, caller, &self.custody, amount_b)?;
        self.ledger
            .transfer_from(&pool.token_a, &self.custody, caller, &self.custody, amount_a)?;
        if let Err(e) = self
            .ledger
            .transfer_from(&pool.token_b, &self.custody, caller, &self.custody, amount_b)
        {
            if let Err(cause) = self.ledger.transfer(&pool.token_a, &self.custody, caller, amount_a) {
                self.credit_owed(*caller, pool.token_a, amount_a);
                warn!(user = %caller, amount = amount_a, error = %cause, "refund of first leg failed, credited as owed");
                return Err(FarmingError::RefundDeferred { depositor: *caller, amount: amount_a, cause });
            }
            return Err(e.into());
        }

        let liquidity = position.liquidity;
        self.pools.set_position(*caller, pool_id, position);
        self.pools.set_pool(pool);
        info!(user = %caller, pool = pool_id, amount_a, amount_b, liquidity, "liquidity deposited");
        Ok(liquidity)
    }

    /// Withdraw `liquidity` units. Both legs are returned pro rata minus the
    /// dynamic exit fee; accrued rewards are harvested up to the reward
    /// budget and the rest stays accrued.
    pub fn withdraw_liquidity(
        &mut self,
        caller: &Address,
        pool_id: PoolId,
        liquidity: u128,
    ) -> Result<WithdrawReceipt, FarmingError> {
        self.access.ensure_not_paused()?;
        let before_pool = self.pools.active_pool(pool_id)?.clone();
        let before_position = self.pools.active_position(caller, pool_id)?.clone();
        if liquidity == 0 {
            return Err(FarmingError::ZeroAmount);
        }
        if liquidity > before_position.liquidity {
            return Err(FarmingError::InsufficientLiquidity { have: before_position.liquidity, need: liquidity });
        }

        let now = self.now();
        let mut pool = before_pool.clone();
        let mut position = before_position.clone();
        self.accrue(caller, &pool, &mut position, now)?;

        let a_out = mul_div(position.amount_a, liquidity, position.liquidity)?;
        let b_out = liquidity - a_out;
        let fee_bps = dynamic_fee(
            pool.params.fee_initial_bps,
            pool.params.fee_final_bps,
            pool.params.vesting_weeks,
            now.saturating_sub(position.position_start),
        );
        let fee_a = apply_bps(a_out, fee_bps)?;
        let fee_b = apply_bps(b_out, fee_bps)?;
        let accrued = position.accrued_rewards;
        let reward = accrued.min(self.reward_budget());
        if reward < accrued {
            warn!(user = %caller, pool = pool_id, accrued, paid = reward, "reward budget short, remainder stays accrued");
        }
        let protocol_fee = apply_bps(reward, self.protocol_fee_bps)?;
        let net_reward = reward - protocol_fee;
        let payouts = [
            (pool.token_a, a_out - fee_a),
            (pool.token_b, b_out - fee_b),
            (self.reward_token, net_reward),
        ];
        self.preflight(caller, &payouts)?;

        position.liquidity -= liquidity;
        position.amount_a -= a_out;
        position.amount_b -= b_out;
        position.accrued_rewards = accrued - reward;
        position.claimed_rewards = position.claimed_rewards.saturating_add(net_reward);
        position.last_claim = now;
        position.active = position.liquidity > 0;
        pool.total_liquidity -= liquidity;
        pool.reserve_a = pool.reserve_a.saturating_sub(a_out);
        pool.reserve_b = pool.reserve_b.saturating_sub(b_out);
        pool.fee_reserve_a = pool.fee_reserve_a.saturating_add(fee_a);
        pool.fee_reserve_b = pool.fee_reserve_b.saturating_add(fee_b);
        pool.total_rewards_paid = pool.total_rewards_paid.saturating_add(net_reward);
        let closed = !position.active;

        self.pools.set_position(*caller, pool_id, position);
        self.pools.set_pool(pool);
        self.total_rewards_distributed = self.total_rewards_distributed.saturating_add(net_reward);
        self.protocol_fees = self.protocol_fees.saturating_add(protocol_fee);

        match self.pay_out(caller, &payouts) {
            Ok(()) => {}
            Err(PayoutFailure::Untouched(e)) => {
                self.pools.set_position(*caller, pool_id, before_position);
                self.pools.set_pool(before_pool);
                self.total_rewards_distributed -= net_reward;
                self.protocol_fees -= protocol_fee;
                warn!(user = %caller, pool = pool_id, error = %e, "withdrawal payout failed, rolled back");
                return Err(e.into());
            }
            Err(PayoutFailure::Deferred(cause)) => {
                return Err(FarmingError::PayoutDeferred { recipient: *caller, cause });
            }
        }

        info!(
            user = %caller, pool = pool_id, liquidity, fee_bps, reward = net_reward, closed,
            "liquidity withdrawn"
        );
        Ok(WithdrawReceipt {
            liquidity,
            amount_a: a_out - fee_a,
            amount_b: b_out - fee_b,
            fee_bps,
            fee_a,
            fee_b,
            reward: net_reward,
            protocol_fee,
        })
    }

    /// Pay out accrued rewards without touching liquidity. Returns the amount
    /// received after the protocol fee.
    pub fn claim_rewards(&mut self, caller: &Address, pool_id: PoolId) -> Result<u128, FarmingError> {
        self.access.ensure_not_paused()?;
        let pool = self.pools.active_pool(pool_id)?.clone();
        // A closed position may still hold rewards a withdrawal could not pay.
        let before_position = self
            .pools
            .position(caller, pool_id)
            .filter(|p| p.active || p.accrued_rewards > 0)
            .cloned()
            .ok_or(FarmingError::NotActiveInPool { participant: *caller, pool: pool_id })?;

        let now = self.now();
        let mut position = before_position.clone();
        self.accrue(caller, &pool, &mut position, now)?;
        let reward = position.accrued_rewards;
        if reward == 0 {
            return Err(FarmingError::NothingToClaim);
        }
        let protocol_fee = apply_bps(reward, self.protocol_fee_bps)?;
        let net_reward = reward - protocol_fee;
        self.ensure_reward_budget(reward)?;

        position.accrued_rewards = 0;
        position.claimed_rewards = position.claimed_rewards.saturating_add(net_reward);
        position.last_claim = now;
        let mut updated_pool = pool.clone();
        updated_pool.total_rewards_paid = updated_pool.total_rewards_paid.saturating_add(net_reward);

        self.pools.set_position(*caller, pool_id, position);
        self.pools.set_pool(updated_pool);
        self.total_rewards_distributed = self.total_rewards_distributed.saturating_add(net_reward);
        self.protocol_fees = self.protocol_fees.saturating_add(protocol_fee);

        if let Err(e) = self.ledger.transfer(&self.reward_token, &self.custody, caller, net_reward) {
            self.pools.set_position(*caller, pool_id, before_position);
            self.pools.set_pool(pool);
            self.total_rewards_distributed -= net_reward;
            self.protocol_fees -= protocol_fee;
            warn!(user = %caller, pool = pool_id, error = %e, "reward payout failed, rolled back");
            return Err(e.into());
        }
        info!(user = %caller, pool = pool_id, reward = net_reward, protocol_fee, "rewards claimed");
        Ok(net_reward)
    }

    /// Return both legs in full, forfeiting rewards and skipping the exit
    /// fee. Works while the protocol or the pool is paused.
    pub fn emergency_withdraw(&mut self, caller: &Address, pool_id: PoolId) -> Result<(u128, u128), FarmingError> {
        let before_pool = self.pools.pool(pool_id)?.clone();
        let before_position = self.pools.active_position(caller, pool_id)?.clone();
        let (amount_a, amount_b) = (before_position.amount_a, before_position.amount_b);
        let payouts = [(before_pool.token_a, amount_a), (before_pool.token_b, amount_b)];
        self.preflight(caller, &payouts)?;

        let now = self.now();
        let mut pool = before_pool.clone();
        pool.total_liquidity = pool.total_liquidity.saturating_sub(before_position.liquidity);
        pool.reserve_a = pool.reserve_a.saturating_sub(amount_a);
        pool.reserve_b = pool.reserve_b.saturating_sub(amount_b);
        let position = UserPosition {
            position_start: before_position.position_start,
            last_claim: before_position.last_claim,
            last_accrual: now,
            claimed_rewards: before_position.claimed_rewards,
            ..Default::default()
        };
        self.pools.set_position(*caller, pool_id, position);
        self.pools.set_pool(pool);

        match self.pay_out(caller, &payouts) {
            Ok(()) => {}
            Err(PayoutFailure::Untouched(e)) => {
                self.pools.set_position(*caller, pool_id, before_position);
                self.pools.set_pool(before_pool);
                warn!(user = %caller, pool = pool_id, error = %e, "emergency payout failed, rolled back");
                return Err(e.into());
            }
            Err(PayoutFailure::Deferred(cause)) => {
                return Err(FarmingError::PayoutDeferred { recipient: *caller, cause });
            }
        }
        warn!(user = %caller, pool = pool_id, amount_a, amount_b, "emergency withdrawal");
        Ok((amount_a, amount_b))
    }

    /// Send the caller's owed balance of `token`, left by an interrupted
    /// payout or refund. Works while paused.
    pub fn withdraw_owed(&mut self, caller: &Address, token: TokenId) -> Result<u128, FarmingError> {
        let key = (*caller, token);
        let amount = self.owed.remove(&key).unwrap_or(0);
        if amount == 0 {
            return Err(FarmingError::NothingToClaim);
        }
        if let Err(e) = self.ledger.transfer(&token, &self.custody, caller, amount) {
            self.owed.insert(key, amount);
            return Err(e.into());
        }
        info!(user = %caller, %token, amount, "owed balance withdrawn");
        Ok(amount)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn owed_balance(&self, user: &Address, token: &TokenId) -> u128 {
        self.owed.get(&(*user, *token)).copied().unwrap_or(0)
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.access.is_paused()
    }

    pub fn pool(&self, pool_id: PoolId) -> Result<&Pool, FarmingError> {
        self.pools.pool(pool_id)
    }

    pub fn position(&self, user: &Address, pool_id: PoolId) -> Option<&UserPosition> {
        self.pools.position(user, pool_id)
    }

    /// Reward owed to `user` in `pool_id` right now. Zero without an active
    /// position.
    pub fn calculate_rewards(&self, user: &Address, pool_id: PoolId) -> Result<RewardBreakdown, FarmingError> {
        let pool = self.pools.pool(pool_id)?;
        let now = self.peek_now();
        let position = self
            .pools
            .position(user, pool_id)
            .cloned()
            .unwrap_or(UserPosition { position_start: now, ..Default::default() });
        self.breakdown(user, pool, &position, now)
    }

    pub fn calculate_user_multipliers(&self, user: &Address, pool_id: PoolId) -> Result<Multipliers, FarmingError> {
        let pool = self.pools.pool(pool_id)?;
        let now = self.peek_now();
        let start = self
            .pools
            .position(user, pool_id)
            .filter(|p| p.active)
            .map_or(now, |p| p.position_start);
        Ok(self.multipliers_for(user, pool, start, now))
    }

    /// Exit fee in basis points that a withdrawal would pay right now.
    pub fn calculate_dynamic_fee(&self, user: &Address, pool_id: PoolId) -> Result<u128, FarmingError> {
        let pool = self.pools.pool(pool_id)?;
        let position = self.pools.active_position(user, pool_id)?;
        Ok(dynamic_fee(
            pool.params.fee_initial_bps,
            pool.params.fee_final_bps,
            pool.params.vesting_weeks,
            self.peek_now().saturating_sub(position.position_start),
        ))
    }

    pub fn calculate_exponential_time_bonus(&self, weeks: u32) -> u128 {
        exponential_time_bonus(weeks)
    }

    pub fn user_active_pools_count(&self, user: &Address) -> usize {
        self.pools.active_pools_of(user)
    }

    pub fn is_pool_active(&self, pool_id: PoolId) -> bool {
        self.pools.pool(pool_id).is_ok_and(|p| p.active)
    }

    pub fn total_pools(&self) -> usize {
        self.pools.len()
    }

    pub fn protocol_fee_bps(&self) -> u128 {
        self.protocol_fee_bps
    }

    pub fn min_deposit(&self) -> u128 {
        self.min_deposit
    }

    pub fn custody(&self) -> Address {
        self.custody
    }

    pub fn reward_token(&self) -> TokenId {
        self.reward_token
    }

    pub fn protocol_stats(&self) -> ProtocolStats {
        ProtocolStats {
            total_pools: self.pools.len(),
            active_pools: self.pools.pools().filter(|p| p.active).count(),
            total_value_locked: self.pools.pools().map(|p| p.total_liquidity).sum(),
            total_rewards_distributed: self.total_rewards_distributed,
            protocol_fees: self.protocol_fees,
        }
    }
}
