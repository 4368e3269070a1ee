//! Pool and position bookkeeping.
//!
//! Liquidity units are the running sum of deposited leg amounts. They are a
//! bookkeeping quantity, not a priced LP share.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use oxs_core::constants::{BPS_PRECISION, MULTIPLIER_PRECISION};
use oxs_core::error::FarmingError;
use oxs_core::{Address, TokenId};

pub type PoolId = u64;

/// Owner-chosen economics of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    pub base_apy_bps: u128,
    /// Cap on the combined tier and staking multiplier (1_000 = 1.0x).
    pub max_multiplier: u128,
    pub fee_initial_bps: u128,
    pub fee_final_bps: u128,
    pub vesting_weeks: u32,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            base_apy_bps: 1_000,
            max_multiplier: 3_000,
            fee_initial_bps: 500,
            fee_final_bps: 50,
            vesting_weeks: 52,
        }
    }
}

impl PoolParams {
    pub fn validate(&self) -> Result<(), FarmingError> {
        if self.fee_initial_bps < self.fee_final_bps || self.fee_initial_bps > BPS_PRECISION {
            return Err(FarmingError::InvalidFeeSchedule {
                initial: self.fee_initial_bps,
                final_fee: self.fee_final_bps,
                max: BPS_PRECISION,
            });
        }
        check_multiplier(self.max_multiplier)
    }
}

pub(crate) fn check_multiplier(max_multiplier: u128) -> Result<(), FarmingError> {
    if max_multiplier < MULTIPLIER_PRECISION {
        return Err(FarmingError::InvalidMultiplier(max_multiplier));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub token_a: TokenId,
    pub token_b: TokenId,
    pub params: PoolParams,
    pub total_liquidity: u128,
    /// Leg balances owed to active positions.
    pub reserve_a: u128,
    pub reserve_b: u128,
    /// Exit fees retained from withdrawals.
    pub fee_reserve_a: u128,
    pub fee_reserve_b: u128,
    pub total_rewards_paid: u128,
    pub active: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    pub liquidity: u128,
    pub amount_a: u128,
    pub amount_b: u128,
    pub position_start: u64,
    pub last_claim: u64,
    /// Time up to which rewards have been folded into `accrued_rewards`.
    pub last_accrual: u64,
    pub accrued_rewards: u128,
    pub claimed_rewards: u128,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PoolLedger {
    pools: BTreeMap<PoolId, Pool>,
    positions: HashMap<(Address, PoolId), UserPosition>,
    next_id: PoolId,
}

impl PoolLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, token_a: TokenId, token_b: TokenId, params: PoolParams, now: u64) -> PoolId {
        let id = self.next_id;
        self.next_id += 1;
        self.pools.insert(
            id,
            Pool {
                id,
                token_a,
                token_b,
                params,
                total_liquidity: 0,
                reserve_a: 0,
                reserve_b: 0,
                fee_reserve_a: 0,
                fee_reserve_b: 0,
                total_rewards_paid: 0,
                active: true,
                created_at: now,
            },
        );
        id
    }

    pub fn pool(&self, id: PoolId) -> Result<&Pool, FarmingError> {
        self.pools.get(&id).ok_or(FarmingError::PoolNotFound(id))
    }

    pub fn pool_mut(&mut self, id: PoolId) -> Result<&mut Pool, FarmingError> {
        self.pools.get_mut(&id).ok_or(FarmingError::PoolNotFound(id))
    }

    /// Existing and active pool.
    pub fn active_pool(&self, id: PoolId) -> Result<&Pool, FarmingError> {
        let pool = self.pool(id)?;
        if !pool.active {
            return Err(FarmingError::PoolInactive(id));
        }
        Ok(pool)
    }

    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.pools.values()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn position(&self, user: &Address, id: PoolId) -> Option<&UserPosition> {
        self.positions.get(&(*user, id))
    }

    /// Active position of `user` in `id`.
    pub fn active_position(&self, user: &Address, id: PoolId) -> Result<&UserPosition, FarmingError> {
        self.positions
            .get(&(*user, id))
            .filter(|p| p.active)
            .ok_or(FarmingError::NotActiveInPool { participant: *user, pool: id })
    }

    pub fn set_position(&mut self, user: Address, id: PoolId, position: UserPosition) {
        self.positions.insert((user, id), position);
    }

    pub fn set_pool(&mut self, pool: Pool) {
        self.pools.insert(pool.id, pool);
    }

    pub fn active_pools_of(&self, user: &Address) -> usize {
        self.positions
            .iter()
            .filter(|((owner, _), p)| owner == user && p.active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> (TokenId, TokenId) {
        (Address::from_label("token-a"), Address::from_label("token-b"))
    }

    #[test]
    fn default_params_are_valid() {
        assert!(PoolParams::default().validate().is_ok());
    }

    #[test]
    fn fee_schedule_validation() {
        let inverted = PoolParams { fee_initial_bps: 50, fee_final_bps: 500, ..Default::default() };
        assert!(matches!(inverted.validate(), Err(FarmingError::InvalidFeeSchedule { .. })));
        let huge = PoolParams { fee_initial_bps: 10_001, ..Default::default() };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn multiplier_validation() {
        let low = PoolParams { max_multiplier: 999, ..Default::default() };
        assert_eq!(low.validate(), Err(FarmingError::InvalidMultiplier(999)));
    }

    #[test]
    fn ids_are_sequential() {
        let mut ledger = PoolLedger::new();
        let (a, b) = tokens();
        assert_eq!(ledger.create(a, b, PoolParams::default(), 0), 0);
        assert_eq!(ledger.create(a, b, PoolParams::default(), 0), 1);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.pool(999), Err(FarmingError::PoolNotFound(999)));
    }

    #[test]
    fn inactive_pool_lookup() {
        let mut ledger = PoolLedger::new();
        let (a, b) = tokens();
        let id = ledger.create(a, b, PoolParams::default(), 0);
        ledger.pool_mut(id).unwrap().active = false;
        assert_eq!(ledger.active_pool(id), Err(FarmingError::PoolInactive(id)));
    }

    #[test]
    fn active_position_counting() {
        let mut ledger = PoolLedger::new();
        let alice = Address::from_label("alice");
        let live = UserPosition { liquidity: 10, active: true, ..Default::default() };
        ledger.set_position(alice, 0, live.clone());
        ledger.set_position(alice, 1, UserPosition::default());
        ledger.set_position(Address::from_label("bob"), 0, live);
        assert_eq!(ledger.active_pools_of(&alice), 1);
        assert!(ledger.active_position(&alice, 1).is_err());
        assert!(ledger.active_position(&alice, 0).is_ok());
    }
}
