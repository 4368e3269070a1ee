//! Eligible claimer registry.
//!
//! Profiles are never deleted. Removal clears the eligibility flag so claim
//! history and cumulative totals survive; the eligible counter tracks only
//! profiles whose flag is set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use oxs_core::constants::{MAX_LOCK_WEEKS, MAX_PRODUCTIVITY};
use oxs_core::error::MathError;
use oxs_core::{Address, user_weight};

/// Staking metrics and derived weight of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub staked_amount: u128,
    /// Clamped to `0..=100`.
    pub productivity: u32,
    /// Clamped to `0..=104`.
    pub lock_weeks: u32,
    pub weight: u128,
    pub eligible: bool,
    pub total_claimed: u128,
}

/// Validated metrics ready to be written into a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    pub staked_amount: u128,
    pub productivity: u32,
    pub lock_weeks: u32,
    pub weight: u128,
}

impl Metrics {
    /// Clamp inputs and compute the weight.
    pub fn new(staked_amount: u128, productivity: u32, lock_weeks: u32) -> Result<Self, MathError> {
        Ok(Self {
            staked_amount,
            productivity: productivity.min(MAX_PRODUCTIVITY),
            lock_weeks: lock_weeks.min(MAX_LOCK_WEEKS),
            weight: user_weight(staked_amount, productivity, lock_weeks)?,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimerRegistry {
    profiles: BTreeMap<Address, ParticipantProfile>,
    total_eligible: usize,
}

impl ClaimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite metrics and mark the participant eligible.
    ///
    /// Returns `true` if the participant became eligible with this call.
    pub fn upsert(&mut self, participant: Address, metrics: Metrics) -> bool {
        let profile = self.profiles.entry(participant).or_insert_with(|| ParticipantProfile {
            staked_amount: 0,
            productivity: 0,
            lock_weeks: 0,
            weight: 0,
            eligible: false,
            total_claimed: 0,
        });
        profile.staked_amount = metrics.staked_amount;
        profile.productivity = metrics.productivity;
        profile.lock_weeks = metrics.lock_weeks;
        profile.weight = metrics.weight;

        let newly_eligible = !profile.eligible;
        profile.eligible = true;
        if newly_eligible {
            self.total_eligible += 1;
        }
        newly_eligible
    }

    /// Clear eligibility. Returns `false` if the participant was not eligible.
    pub fn remove(&mut self, participant: &Address) -> bool {
        match self.profiles.get_mut(participant) {
            Some(profile) if profile.eligible => {
                profile.eligible = false;
                self.total_eligible -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, participant: &Address) -> Option<&ParticipantProfile> {
        self.profiles.get(participant)
    }

    pub fn is_eligible(&self, participant: &Address) -> bool {
        self.profiles.get(participant).is_some_and(|p| p.eligible)
    }

    pub fn total_eligible(&self) -> usize {
        self.total_eligible
    }

    pub fn add_claimed(&mut self, participant: &Address, amount: u128) {
        if let Some(profile) = self.profiles.get_mut(participant) {
            profile.total_claimed = profile.total_claimed.saturating_add(amount);
        }
    }

    pub fn sub_claimed(&mut self, participant: &Address, amount: u128) {
        if let Some(profile) = self.profiles.get_mut(participant) {
            profile.total_claimed = profile.total_claimed.saturating_sub(amount);
        }
    }

    /// Weights of all currently eligible participants, ordered by address.
    pub fn eligible_weights(&self) -> BTreeMap<Address, u128> {
        self.profiles
            .iter()
            .filter(|(_, p)| p.eligible)
            .map(|(a, p)| (*a, p.weight))
            .collect()
    }

    /// Sum of eligible weights.
    pub fn total_weight(&self) -> Result<u128, MathError> {
        self.profiles
            .values()
            .filter(|p| p.eligible)
            .try_fold(0u128, |acc, p| acc.checked_add(p.weight).ok_or(MathError::Overflow))
    }
}
