//! The staking, tier and farming engines wired together.
//!
//! Staking and tier engines are shared behind `RwLock`s so the farming
//! engine reads live tier and staking signals through its source traits.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use tracing::info;

use oxs_core::{Address, Clock, StakingActivity, TierId, TokenId, TokenLedger};
use oxs_farming::{FarmingEngine, PoolId, PoolParams, ProtocolStats};
use oxs_staking::StakingEngine;
use oxs_tier::{NO_TIER_NAME, TierEngine};

use crate::config::ProtocolConfig;
use crate::error::ProtocolError;

/// Identities the engines are deployed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolAccounts {
    pub owner: Address,
    /// The OXS token.
    pub token: TokenId,
    pub staking_custody: Address,
    pub tier_custody: Address,
    pub farming_custody: Address,
}

impl ProtocolAccounts {
    /// Custody addresses derived from fixed labels.
    pub fn with_labelled_custody(owner: Address, token: TokenId) -> Self {
        Self {
            owner,
            token,
            staking_custody: Address::from_label("oxs/staking-custody"),
            tier_custody: Address::from_label("oxs/tier-custody"),
            farming_custody: Address::from_label("oxs/farming-custody"),
        }
    }
}

/// Cross-engine view of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantOverview {
    pub tier: TierId,
    pub tier_name: String,
    pub tier_stake: u128,
    pub staking_eligible: bool,
    pub has_active_staking: bool,
    pub pending_staking_rewards: u128,
    pub active_pools: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSnapshot {
    pub current_week: u32,
    pub total_released: u128,
    pub staking_reserve: u128,
    pub total_eligible: usize,
    pub tier_count: u8,
    pub tier_total_staked: u128,
    pub farming: ProtocolStats,
}

pub struct Protocol {
    accounts: ProtocolAccounts,
    pool_template: PoolParams,
    staking: Arc<RwLock<StakingEngine>>,
    tiers: Arc<RwLock<TierEngine>>,
    farming: FarmingEngine,
}

impl Protocol {
    pub fn new(
        config: &ProtocolConfig,
        accounts: ProtocolAccounts,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let staking = StakingEngine::new(
            config.staking.clone(),
            accounts.owner,
            accounts.token,
            accounts.staking_custody,
            ledger.clone(),
            clock.clone(),
        )?;
        let tiers = TierEngine::new(
            &config.tier,
            accounts.owner,
            accounts.token,
            accounts.tier_custody,
            ledger.clone(),
            clock.clone(),
        )?;
        let staking = Arc::new(RwLock::new(staking));
        let tiers = Arc::new(RwLock::new(tiers));
        let farming = FarmingEngine::new(
            &config.farming,
            accounts.owner,
            accounts.token,
            accounts.farming_custody,
            ledger,
            clock,
        )?
        .with_tier_source(tiers.clone())
        .with_staking_source(staking.clone());

        info!(owner = %accounts.owner, token = %accounts.token, "protocol assembled");
        Ok(Self {
            accounts,
            pool_template: config.pool.params(),
            staking,
            tiers,
            farming,
        })
    }

    pub fn accounts(&self) -> &ProtocolAccounts {
        &self.accounts
    }

    pub fn staking(&self) -> RwLockReadGuard<'_, StakingEngine> {
        self.staking.read()
    }

    pub fn staking_mut(&self) -> RwLockWriteGuard<'_, StakingEngine> {
        self.staking.write()
    }

    pub fn tiers(&self) -> RwLockReadGuard<'_, TierEngine> {
        self.tiers.read()
    }

    pub fn tiers_mut(&self) -> RwLockWriteGuard<'_, TierEngine> {
        self.tiers.write()
    }

    pub fn farming(&self) -> &FarmingEngine {
        &self.farming
    }

    pub fn farming_mut(&mut self) -> &mut FarmingEngine {
        &mut self.farming
    }

    /// Create a farming pool with the configured template.
    pub fn create_pool(&mut self, caller: &Address, token_a: TokenId, token_b: TokenId) -> Result<PoolId, ProtocolError> {
        Ok(self.farming.create_pool(caller, token_a, token_b, self.pool_template)?)
    }

    pub fn participant_overview(&self, user: &Address) -> ParticipantOverview {
        let (tier, tier_name, tier_stake) = {
            let tiers = self.tiers.read();
            let tier = tiers.user_tier(user);
            let name = match tier {
                0 => NO_TIER_NAME.to_string(),
                id => tiers
                    .tier_info(id)
                    .map_or_else(|_| NO_TIER_NAME.to_string(), |t| t.name),
            };
            (tier, name, tiers.staked_balance(user))
        };
        let staking = self.staking.read();
        ParticipantOverview {
            tier,
            tier_name,
            tier_stake,
            staking_eligible: staking.is_eligible(user),
            has_active_staking: staking.has_active_staking(user),
            pending_staking_rewards: staking.pending_rewards(user),
            active_pools: self.farming.user_active_pools_count(user),
        }
    }

    pub fn snapshot(&self) -> ProtocolSnapshot {
        let staking = self.staking.read();
        let tiers = self.tiers.read();
        ProtocolSnapshot {
            current_week: staking.current_week(),
            total_released: staking.total_released(),
            staking_reserve: staking.reserve_balance(),
            total_eligible: staking.total_eligible(),
            tier_count: tiers.tier_count(),
            tier_total_staked: tiers.total_staked(),
            farming: self.farming.protocol_stats(),
        }
    }
}
