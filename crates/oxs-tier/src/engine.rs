//! Tier engine: user stakes held in custody, classified through the tier
//! table, with conversion rates that grow with staking duration.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use oxs_core::access::ensure_valid_address;
use oxs_core::constants::{DEFAULT_MAX_TIERS, ONE_OXS, SECONDS_PER_WEEK};
use oxs_core::error::TierError;
use oxs_core::math::mul_div;
use oxs_core::{AccessControl, Address, Clock, TierId, TierSource, TokenId, TokenLedger};

use crate::progression::{conversion_rate_at, progression};
use crate::table::{TierCurve, TierDefinition};

/// Name reported for participants below the first threshold.
pub const NO_TIER_NAME: &str = "No Tier";

/// One configured tier, amounts in whole OXS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSpec {
    pub name: String,
    pub required_oxs: u64,
    pub cash_value: u64,
    pub base_conversion_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub max_tiers: u8,
    pub tiers: Vec<TierSpec>,
}

impl Default for TierConfig {
    fn default() -> Self {
        let tiers = TierCurve::with_defaults()
            .iter()
            .map(|t| TierSpec {
                name: t.name.clone(),
                required_oxs: (t.required_tokens / ONE_OXS) as u64,
                cash_value: t.cash_value as u64,
                base_conversion_rate: t.base_conversion_rate,
            })
            .collect();
        Self { max_tiers: DEFAULT_MAX_TIERS, tiers }
    }
}

impl TierConfig {
    /// Build the tier table, enforcing the same rules as runtime updates.
    pub fn build_curve(&self) -> Result<TierCurve, TierError> {
        let mut curve = TierCurve::new(self.max_tiers)?;
        for tier in &self.tiers {
            curve.add_tier(
                tier.name.clone(),
                tier.required_oxs as u128 * ONE_OXS,
                tier.cash_value as u128,
                tier.base_conversion_rate,
            )?;
        }
        Ok(curve)
    }
}

/// Stake bookkeeping for one participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTierState {
    /// Tier assigned at the last stake change. Table edits do not reclassify
    /// a participant until their stake changes again.
    pub current_tier: TierId,
    pub staked_amount: u128,
    /// Set on the first nonzero stake; cleared when the stake drops to zero.
    pub staking_start: Option<u64>,
    pub active: bool,
}

/// Everything known about a participant's tier position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTierInfo {
    pub tier: TierId,
    pub tier_name: String,
    pub staked_amount: u128,
    pub cash_value: u128,
    pub base_conversion_rate: u32,
    pub current_conversion_rate: u128,
    pub staking_weeks: u32,
    pub active: bool,
}

pub struct TierEngine {
    access: AccessControl,
    curve: TierCurve,
    users: HashMap<Address, UserTierState>,
    total_staked: u128,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    token: TokenId,
    custody: Address,
    last_seen: u64,
}

impl TierEngine {
    pub fn new(
        config: &TierConfig,
        owner: Address,
        token: TokenId,
        custody: Address,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TierError> {
        ensure_valid_address(&token)?;
        ensure_valid_address(&custody)?;
        let access = AccessControl::new(owner)?;
        let curve = config.build_curve()?;
        let last_seen = clock.now();
        info!(%owner, tiers = curve.count(), max_tiers = curve.max_tiers(), "tier engine initialised");
        Ok(Self {
            access,
            curve,
            users: HashMap::new(),
            total_staked: 0,
            ledger,
            clock,
            token,
            custody,
            last_seen,
        })
    }

    fn now(&mut self) -> u64 {
        self.last_seen = self.peek_now();
        self.last_seen
    }

    fn peek_now(&self) -> u64 {
        self.clock.now().max(self.last_seen)
    }

    // ------------------------------------------------------------------
    // Tier administration (owner)
    // ------------------------------------------------------------------

    pub fn add_tier(
        &mut self,
        caller: &Address,
        name: &str,
        required_tokens: u128,
        cash_value: u128,
        base_conversion_rate: u32,
    ) -> Result<TierId, TierError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        let id = self.curve.add_tier(name, required_tokens, cash_value, base_conversion_rate)?;
        info!(tier = id, name, required_tokens, "tier added");
        Ok(id)
    }

    pub fn update_tier(
        &mut self,
        caller: &Address,
        id: TierId,
        name: &str,
        required_tokens: u128,
        cash_value: u128,
        base_conversion_rate: u32,
    ) -> Result<(), TierError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        self.curve.update_tier(id, name, required_tokens, cash_value, base_conversion_rate)?;
        info!(tier = id, name, required_tokens, "tier updated");
        Ok(())
    }

    pub fn set_tier_active(&mut self, caller: &Address, id: TierId, active: bool) -> Result<(), TierError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        self.curve.set_active(id, active)?;
        info!(tier = id, active, "tier status changed");
        Ok(())
    }

    pub fn set_max_tiers(&mut self, caller: &Address, max_tiers: u8) -> Result<(), TierError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        self.curve.set_max_tiers(max_tiers)?;
        info!(max_tiers, "tier limit changed");
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), TierError> {
        Ok(self.access.pause(caller)?)
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), TierError> {
        Ok(self.access.unpause(caller)?)
    }

    // ------------------------------------------------------------------
    // User stake
    // ------------------------------------------------------------------

    /// Set `user`'s stake to `amount`, moving the difference between the
    /// user and tier custody. Owner or the user itself. Returns the new tier.
    ///
    /// Increases pull from the user against an allowance granted to the
    /// custody address; decreases are paid back from custody. State is
    /// updated first and restored if the transfer fails.
    pub fn update_user_stake(&mut self, caller: &Address, user: Address, amount: u128) -> Result<TierId, TierError> {
        self.access.ensure_not_paused()?;
        ensure_valid_address(&user)?;
        self.access.ensure_owner_or_self(caller, &user)?;

        let now = self.now();
        let previous = self.users.get(&user).copied().unwrap_or_default();
        let next = UserTierState {
            current_tier: self.curve.tier_of(amount),
            staked_amount: amount,
            staking_start: match (amount, previous.staking_start) {
                (0, _) => None,
                (_, Some(start)) => Some(start),
                (_, None) => Some(now),
            },
            active: amount > 0,
        };
        let prev_total = self.total_staked;
        self.total_staked = self
            .total_staked
            .saturating_sub(previous.staked_amount)
            .saturating_add(amount);
        self.users.insert(user, next);

        let moved = if amount > previous.staked_amount {
            self.ledger.transfer_from(&self.token, &self.custody, &user, &self.custody, amount - previous.staked_amount)
        } else if amount < previous.staked_amount {
            self.ledger.transfer(&self.token, &self.custody, &user, previous.staked_amount - amount)
        } else {
            Ok(())
        };
        if let Err(e) = moved {
            self.users.insert(user, previous);
            self.total_staked = prev_total;
            warn!(%user, amount, error = %e, "stake transfer failed, rolled back");
            return Err(e.into());
        }

        info!(%user, amount, tier = next.current_tier, "stake updated");
        Ok(next.current_tier)
    }

    /// Return the caller's whole stake and clear their tier. Works while
    /// the engine is paused.
    pub fn emergency_unstake(&mut self, caller: &Address) -> Result<u128, TierError> {
        let user = *caller;
        let previous = self.users.get(&user).copied().unwrap_or_default();
        if previous.staked_amount == 0 {
            return Err(TierError::NothingStaked(user));
        }
        let prev_total = self.total_staked;
        self.total_staked = self.total_staked.saturating_sub(previous.staked_amount);
        self.users.insert(user, UserTierState::default());

        if let Err(e) = self.ledger.transfer(&self.token, &self.custody, &user, previous.staked_amount) {
            self.users.insert(user, previous);
            self.total_staked = prev_total;
            warn!(%user, error = %e, "emergency unstake failed, rolled back");
            return Err(e.into());
        }
        warn!(%user, amount = previous.staked_amount, "emergency unstake");
        Ok(previous.staked_amount)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn is_paused(&self) -> bool {
        self.access.is_paused()
    }

    pub fn curve(&self) -> &TierCurve {
        &self.curve
    }

    pub fn tier_count(&self) -> u8 {
        self.curve.count()
    }

    pub fn max_tiers(&self) -> u8 {
        self.curve.max_tiers()
    }

    pub fn tier_info(&self, id: TierId) -> Result<TierDefinition, TierError> {
        self.curve.get(id).cloned()
    }

    pub fn tier_for_amount(&self, amount: u128) -> TierId {
        self.curve.tier_of(amount)
    }

    pub fn user_tier_info(&self, user: &Address) -> UserTierState {
        self.users.get(user).copied().unwrap_or_default()
    }

    pub fn user_tier(&self, user: &Address) -> TierId {
        let state = self.user_tier_info(user);
        if state.active { state.current_tier } else { 0 }
    }

    fn user_tier_definition(&self, user: &Address) -> Option<&TierDefinition> {
        match self.user_tier(user) {
            0 => None,
            id => self.curve.get(id).ok(),
        }
    }

    pub fn user_cash_value(&self, user: &Address) -> u128 {
        self.user_tier_definition(user).map_or(0, |t| t.cash_value)
    }

    pub fn user_base_conversion_rate(&self, user: &Address) -> u32 {
        self.user_tier_definition(user).map_or(0, |t| t.base_conversion_rate)
    }

    /// Whole weeks since the user's staking start.
    pub fn user_staking_weeks(&self, user: &Address) -> u32 {
        match self.user_tier_info(user).staking_start {
            Some(start) => {
                let elapsed = self.peek_now().saturating_sub(start) / SECONDS_PER_WEEK;
                u32::try_from(elapsed).unwrap_or(u32::MAX)
            }
            None => 0,
        }
    }

    /// `base_rate * progression(weeks) / progression(0)`.
    pub fn user_conversion_rate(&self, user: &Address) -> Result<u128, TierError> {
        let base = self.user_base_conversion_rate(user) as u128;
        let weeks = self.user_staking_weeks(user);
        let rate = mul_div(base, conversion_rate_at(weeks) as u128, conversion_rate_at(0) as u128)?;
        debug!(%user, base, weeks, rate, "conversion rate");
        Ok(rate)
    }

    pub fn simulate_conversion_rate_for_weeks(&self, weeks: u32) -> u32 {
        conversion_rate_at(weeks)
    }

    pub fn conversion_rate_progression(&self, from: u32, to: u32) -> Result<Vec<u32>, TierError> {
        progression(from, to)
    }

    /// Whether the user's current stake reaches tier `id`.
    pub fn qualifies_for_tier(&self, user: &Address, id: TierId) -> Result<bool, TierError> {
        self.curve.qualifies_for(self.user_tier_info(user).staked_amount, id)
    }

    pub fn user_complete_info(&self, user: &Address) -> Result<UserTierInfo, TierError> {
        let state = self.user_tier_info(user);
        let tier = self.user_tier_definition(user);
        Ok(UserTierInfo {
            tier: tier.map_or(0, |t| t.id),
            tier_name: tier.map_or_else(|| NO_TIER_NAME.to_string(), |t| t.name.clone()),
            staked_amount: state.staked_amount,
            cash_value: tier.map_or(0, |t| t.cash_value),
            base_conversion_rate: tier.map_or(0, |t| t.base_conversion_rate),
            current_conversion_rate: self.user_conversion_rate(user)?,
            staking_weeks: self.user_staking_weeks(user),
            active: state.active,
        })
    }

    pub fn staked_balance(&self, user: &Address) -> u128 {
        self.user_tier_info(user).staked_amount
    }

    /// The user's liquid token balance on the external ledger.
    pub fn token_balance(&self, user: &Address) -> u128 {
        self.ledger.balance_of(&self.token, user)
    }

    pub fn total_staked(&self) -> u128 {
        self.total_staked
    }

    pub fn custody(&self) -> Address {
        self.custody
    }
}

impl TierSource for TierEngine {
    fn tier_of_user(&self, user: &Address) -> TierId {
        self.user_tier(user)
    }
}
