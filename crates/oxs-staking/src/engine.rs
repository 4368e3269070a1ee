//! Staking engine: registry, weekly releases and claims behind one owner.
//!
//! Emission tokens sit in a custody address on the external token ledger.
//! Releasing a week only records it; tokens move when participants claim.
//! Every claim marks its record before the payout transfer and restores the
//! record if the transfer fails, so a payout can never be triggered twice.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use oxs_core::access::ensure_valid_address;
use oxs_core::constants::{DEFAULT_EMISSION_BUDGET, MAX_WEEK, ONE_OXS, SECONDS_PER_WEEK};
use oxs_core::error::{MathError, StakingError, TransferError};
use oxs_core::{AccessControl, Address, Clock, EmissionCurve, StakingActivity, TokenId, TokenLedger};

use crate::claims::{ClaimLedger, ClaimRecord, ClaimWeightPolicy, pro_rata_share};
use crate::distribution::{DistributionLedger, WeeklyDistribution};
use crate::registry::{ClaimerRegistry, Metrics, ParticipantProfile};

/// Tunables of the staking engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    /// Total emission budget across the schedule, in whole OXS.
    pub emission_budget_oxs: u64,
    pub claim_weight_policy: ClaimWeightPolicy,
    /// Permit releasing weeks later than the current schedule week.
    pub allow_future_weeks: bool,
}

impl StakingConfig {
    pub fn emission_budget(&self) -> u128 {
        self.emission_budget_oxs as u128 * ONE_OXS
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            emission_budget_oxs: (DEFAULT_EMISSION_BUDGET / ONE_OXS) as u64,
            claim_weight_policy: ClaimWeightPolicy::default(),
            allow_future_weeks: false,
        }
    }
}

/// Summary of a participant for queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDetails {
    pub staked_amount: u128,
    pub productivity: u32,
    pub lock_weeks: u32,
    pub weight: u128,
    pub eligible: bool,
    pub total_claimed: u128,
    /// Released, unclaimed weeks with a positive share.
    pub pending_claims: usize,
    pub pending_amount: u128,
}

pub struct StakingEngine {
    config: StakingConfig,
    access: AccessControl,
    registry: ClaimerRegistry,
    distributions: DistributionLedger,
    claims: ClaimLedger,
    curve: EmissionCurve,
    ledger: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    token: TokenId,
    custody: Address,
    genesis: u64,
    last_seen: u64,
}

impl StakingEngine {
    /// Create an engine whose schedule starts at the clock's current time.
    pub fn new(
        config: StakingConfig,
        owner: Address,
        token: TokenId,
        custody: Address,
        ledger: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StakingError> {
        ensure_valid_address(&token)?;
        ensure_valid_address(&custody)?;
        let access = AccessControl::new(owner)?;
        let curve = EmissionCurve::new(config.emission_budget())?;
        let genesis = clock.now();
        info!(%owner, %custody, genesis, budget = curve.budget(), "staking engine initialised");
        Ok(Self {
            config,
            access,
            registry: ClaimerRegistry::new(),
            distributions: DistributionLedger::new(),
            claims: ClaimLedger::new(),
            curve,
            ledger,
            clock,
            token,
            custody,
            genesis,
            last_seen: genesis,
        })
    }

    fn now(&mut self) -> u64 {
        self.last_seen = self.peek_now();
        self.last_seen
    }

    fn peek_now(&self) -> u64 {
        self.clock.now().max(self.last_seen)
    }

    /// Schedule week derived from time elapsed since genesis.
    pub fn current_week(&self) -> u32 {
        let elapsed = self.peek_now().saturating_sub(self.genesis);
        u32::try_from(elapsed / SECONDS_PER_WEEK).unwrap_or(u32::MAX)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register or update a participant. Owner or the participant itself.
    pub fn add_eligible_claimer(
        &mut self,
        caller: &Address,
        participant: Address,
        amount: u128,
        productivity: u32,
        lock_weeks: u32,
    ) -> Result<(), StakingError> {
        self.access.ensure_not_paused()?;
        ensure_valid_address(&participant)?;
        self.access.ensure_owner_or_self(caller, &participant)?;
        let metrics = Metrics::new(amount, productivity, lock_weeks)?;
        let added = self.registry.upsert(participant, metrics);
        info!(%participant, weight = metrics.weight, added, "eligible claimer updated");
        Ok(())
    }

    /// Update the metrics of an already eligible participant.
    pub fn update_user_metrics(
        &mut self,
        caller: &Address,
        participant: Address,
        amount: u128,
        productivity: u32,
        lock_weeks: u32,
    ) -> Result<(), StakingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner_or_self(caller, &participant)?;
        if !self.registry.is_eligible(&participant) {
            return Err(StakingError::NotEligible(participant));
        }
        let metrics = Metrics::new(amount, productivity, lock_weeks)?;
        self.registry.upsert(participant, metrics);
        debug!(%participant, weight = metrics.weight, "metrics updated");
        Ok(())
    }

    /// Owner-only batch registration from parallel slices.
    ///
    /// Lengths, identities and weights are all validated before the first
    /// insert. Returns how many participants became newly eligible.
    pub fn add_eligible_claimers(
        &mut self,
        caller: &Address,
        participants: &[Address],
        amounts: &[u128],
        productivities: &[u32],
        lock_weeks: &[u32],
    ) -> Result<usize, StakingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        let n = participants.len();
        if amounts.len() != n || productivities.len() != n || lock_weeks.len() != n {
            return Err(StakingError::LengthMismatch {
                addresses: n,
                amounts: amounts.len(),
                productivities: productivities.len(),
                lock_weeks: lock_weeks.len(),
            });
        }

        let mut staged = Vec::with_capacity(n);
        let rows = participants.iter().zip(amounts).zip(productivities).zip(lock_weeks);
        for (((participant, amount), productivity), lock) in rows {
            ensure_valid_address(participant)?;
            staged.push((*participant, Metrics::new(*amount, *productivity, *lock)?));
        }

        let mut added = 0;
        for (participant, metrics) in staged {
            if self.registry.upsert(participant, metrics) {
                added += 1;
            }
        }
        info!(count = n, added, "batch registration");
        Ok(added)
    }

    /// Owner-only. Clears eligibility; history is kept.
    pub fn remove_eligible_claimer(&mut self, caller: &Address, participant: &Address) -> Result<(), StakingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        if !self.registry.remove(participant) {
            return Err(StakingError::NotEligible(*participant));
        }
        info!(%participant, "eligible claimer removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Distribution
    // ------------------------------------------------------------------

    fn validate_release(&self, week: u32) -> Result<u128, StakingError> {
        check_week(week)?;
        if self.distributions.is_released(week) {
            return Err(StakingError::WeekAlreadyDistributed(week));
        }
        if !self.config.allow_future_weeks {
            let current = self.current_week();
            if week > current {
                return Err(StakingError::WeekNotReached { week, current });
            }
        }
        Ok(self.curve.weekly_amount(week)?)
    }

    /// The custody reserve must cover every unpaid release plus `additional`.
    fn ensure_reserve_covers(&self, additional: u128) -> Result<(), StakingError> {
        let need = self
            .distributions
            .outstanding()
            .checked_add(additional)
            .ok_or(MathError::Overflow)?;
        let have = self.reserve_balance();
        if have < need {
            warn!(have, need, "reserve cannot cover release");
            return Err(TransferError::InsufficientBalance { have, need }.into());
        }
        Ok(())
    }

    fn commit_release(
        &mut self,
        week: u32,
        amount: u128,
        total_weight: u128,
        snapshot: BTreeMap<Address, u128>,
        now: u64,
    ) {
        let participants = snapshot.len();
        self.distributions.record(
            WeeklyDistribution {
                week,
                released_amount: amount,
                total_weight_snapshot: total_weight,
                released_at: now,
                claimed_amount: 0,
            },
            snapshot,
        );
        info!(week, amount, total_weight, participants, "week released");
    }

    /// Owner-only. Release a single week. Returns the released amount.
    pub fn release_week(&mut self, caller: &Address, week: u32) -> Result<u128, StakingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        let amount = self.validate_release(week)?;
        self.ensure_reserve_covers(amount)?;
        let total_weight = self.registry.total_weight()?;
        let snapshot = self.registry.eligible_weights();
        let now = self.now();
        self.commit_release(week, amount, total_weight, snapshot, now);
        Ok(amount)
    }

    /// Owner-only. Release `first..=last`; nothing is recorded unless every
    /// week in the range is releasable. Returns the total released.
    pub fn release_range(&mut self, caller: &Address, first: u32, last: u32) -> Result<u128, StakingError> {
        self.access.ensure_not_paused()?;
        self.access.ensure_owner(caller)?;
        if first > last {
            return Err(StakingError::InvalidRange { first, last });
        }

        let mut staged = Vec::new();
        let mut total = 0u128;
        for week in first..=last {
            let amount = self.validate_release(week)?;
            total = total.checked_add(amount).ok_or(MathError::Overflow)?;
            staged.push((week, amount));
        }
        self.ensure_reserve_covers(total)?;

        let total_weight = self.registry.total_weight()?;
        let snapshot = self.registry.eligible_weights();
        let now = self.now();
        for (week, amount) in staged {
            self.commit_release(week, amount, total_weight, snapshot.clone(), now);
        }
        info!(first, last, total, "week range released");
        Ok(total)
    }

    /// Owner-only. Release the current schedule week.
    pub fn release_current_week(&mut self, caller: &Address) -> Result<u128, StakingError> {
        let week = self.current_week();
        self.release_week(caller, week)
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    fn claimable(&self, participant: &Address, week: u32) -> Result<u128, StakingError> {
        check_week(week)?;
        let dist = self
            .distributions
            .get(week)
            .ok_or(StakingError::WeekNotDistributed(week))?;
        if self.claims.has_claimed(participant, week) {
            return Err(StakingError::AlreadyClaimed { participant: *participant, week });
        }
        let profile = self
            .registry
            .get(participant)
            .filter(|p| p.eligible)
            .ok_or(StakingError::NotEligible(*participant))?;
        let weight = match self.config.claim_weight_policy {
            ClaimWeightPolicy::DistributionSnapshot => self.distributions.snapshot_weight(week, participant),
            ClaimWeightPolicy::Current => profile.weight,
        };
        Ok(pro_rata_share(dist.released_amount, weight, dist.total_weight_snapshot, dist.unpaid())?)
    }

    fn apply_claim(&mut self, participant: Address, week: u32, amount: u128, now: u64) {
        self.claims.mark(participant, week, ClaimRecord { paid: amount, claimed_at: now });
        self.distributions.add_claimed(week, amount);
        self.registry.add_claimed(&participant, amount);
    }

    fn revert_claim(&mut self, participant: &Address, week: u32, amount: u128) {
        self.claims.unmark(participant, week);
        self.distributions.sub_claimed(week, amount);
        self.registry.sub_claimed(participant, amount);
    }

    /// Claim the caller's share of `week`.
    pub fn claim(&mut self, caller: &Address, week: u32) -> Result<u128, StakingError> {
        self.access.ensure_not_paused()?;
        let participant = *caller;
        let share = self.claimable(&participant, week)?;
        if share == 0 {
            return Err(StakingError::NothingToClaim);
        }

        let now = self.now();
        self.apply_claim(participant, week, share, now);
        if let Err(e) = self.ledger.transfer(&self.token, &self.custody, &participant, share) {
            self.revert_claim(&participant, week, share);
            warn!(%participant, week, error = %e, "claim payout failed, rolled back");
            return Err(e.into());
        }
        info!(%participant, week, amount = share, "claimed");
        Ok(share)
    }

    /// Claim every valid week in `weeks` with a single payout.
    ///
    /// Invalid, unreleased or already claimed weeks are skipped. Fails only
    /// when the whole batch yields nothing.
    pub fn claim_many(&mut self, caller: &Address, weeks: &[u32]) -> Result<u128, StakingError> {
        self.access.ensure_not_paused()?;
        let participant = *caller;
        let now = self.now();

        let mut applied = Vec::new();
        let mut total = 0u128;
        for &week in weeks {
            match self.claimable(&participant, week) {
                Ok(share) if share > 0 => {
                    self.apply_claim(participant, week, share, now);
                    applied.push((week, share));
                    total = total.saturating_add(share);
                }
                Ok(_) => debug!(week, "zero share, skipped"),
                Err(e) => debug!(week, error = %e, "week skipped"),
            }
        }
        if total == 0 {
            return Err(StakingError::NothingToClaim);
        }

        if let Err(e) = self.ledger.transfer(&self.token, &self.custody, &participant, total) {
            for (week, share) in applied {
                self.revert_claim(&participant, week, share);
            }
            warn!(%participant, error = %e, "batch payout failed, rolled back");
            return Err(e.into());
        }
        info!(%participant, weeks = applied.len(), amount = total, "claimed weeks");
        Ok(total)
    }

    /// Weeks the participant could claim right now, with their shares.
    fn pending(&self, participant: &Address) -> Vec<(u32, u128)> {
        if !self.registry.is_eligible(participant) {
            return Vec::new();
        }
        self.distributions
            .history()
            .filter_map(|d| match self.claimable(participant, d.week) {
                Ok(share) if share > 0 => Some((d.week, share)),
                _ => None,
            })
            .collect()
    }

    /// Total claimable across all released, unclaimed weeks.
    pub fn pending_rewards(&self, participant: &Address) -> u128 {
        self.pending(participant).iter().map(|(_, s)| *s).sum()
    }

    pub fn participant_details(&self, participant: &Address) -> Option<ParticipantDetails> {
        let profile = self.registry.get(participant)?;
        let pending = self.pending(participant);
        Some(ParticipantDetails {
            staked_amount: profile.staked_amount,
            productivity: profile.productivity,
            lock_weeks: profile.lock_weeks,
            weight: profile.weight,
            eligible: profile.eligible,
            total_claimed: profile.total_claimed,
            pending_claims: pending.len(),
            pending_amount: pending.iter().map(|(_, s)| *s).sum(),
        })
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Owner-only. Move reserve tokens out of custody. Allowed while paused.
    pub fn emergency_withdraw(&mut self, caller: &Address, amount: u128, recipient: Address) -> Result<(), StakingError> {
        self.access.ensure_owner(caller)?;
        ensure_valid_address(&recipient)?;
        self.ledger.transfer(&self.token, &self.custody, &recipient, amount)?;
        warn!(%recipient, amount, "emergency withdrawal from staking reserve");
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), StakingError> {
        Ok(self.access.pause(caller)?)
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), StakingError> {
        Ok(self.access.unpause(caller)?)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), StakingError> {
        Ok(self.access.transfer_ownership(caller, new_owner)?)
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

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    pub fn genesis(&self) -> u64 {
        self.genesis
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn custody(&self) -> Address {
        self.custody
    }

    pub fn profile(&self, participant: &Address) -> Option<&ParticipantProfile> {
        self.registry.get(participant)
    }

    pub fn is_eligible(&self, participant: &Address) -> bool {
        self.registry.is_eligible(participant)
    }

    pub fn total_eligible(&self) -> usize {
        self.registry.total_eligible()
    }

    pub fn has_claimed(&self, participant: &Address, week: u32) -> Result<bool, StakingError> {
        check_week(week)?;
        Ok(self.claims.has_claimed(participant, week))
    }

    pub fn claim_record(&self, participant: &Address, week: u32) -> Option<&ClaimRecord> {
        self.claims.get(participant, week)
    }

    pub fn is_week_distributed(&self, week: u32) -> Result<bool, StakingError> {
        check_week(week)?;
        Ok(self.distributions.is_released(week))
    }

    pub fn distribution(&self, week: u32) -> Option<&WeeklyDistribution> {
        self.distributions.get(week)
    }

    /// Ordered history of released weeks.
    pub fn distribution_history(&self) -> Vec<WeeklyDistribution> {
        self.distributions.history().cloned().collect()
    }

    pub fn weekly_amount(&self, week: u32) -> Result<u128, StakingError> {
        Ok(self.curve.weekly_amount(week)?)
    }

    pub fn total_released(&self) -> u128 {
        self.distributions.history().map(|d| d.released_amount).sum()
    }

    pub fn reserve_balance(&self) -> u128 {
        self.ledger.balance_of(&self.token, &self.custody)
    }
}

fn check_week(week: u32) -> Result<(), StakingError> {
    if week > MAX_WEEK {
        return Err(StakingError::WeekLimitExceeded { week, max: MAX_WEEK });
    }
    Ok(())
}

impl StakingActivity for StakingEngine {
    fn has_active_staking(&self, user: &Address) -> bool {
        self.registry
            .get(user)
            .is_some_and(|p| p.eligible && p.staked_amount > 0)
    }
}
