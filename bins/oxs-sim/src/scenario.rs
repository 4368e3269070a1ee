//! Deterministic demo scenario.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use oxs_core::constants::{ONE_OXS, SECONDS_PER_WEEK};
use oxs_core::error::FarmingError;
use oxs_core::{Address, ManualClock, MemoryTokenLedger, TokenId, TokenLedger};
use oxs_farming::{PoolId, WithdrawReceipt};
use oxs_protocol::{ParticipantOverview, Protocol, ProtocolAccounts, ProtocolConfig, ProtocolSnapshot};

pub struct ScenarioSettings {
    pub weeks: u32,
    pub start: u64,
    pub farming_budget_oxs: u64,
}

/// name, tier stake, staked amount, productivity, lock weeks, farming deposit per leg.
/// Amounts in whole OXS.
const PARTICIPANTS: [(&str, u64, u64, u32, u32, u64); 3] = [
    ("alice", 34_000, 20_000, 90, 104, 5_000),
    ("bob", 10_000, 8_000, 60, 52, 2_000),
    ("carol", 0, 3_000, 30, 12, 0),
];

#[derive(Debug, Serialize)]
pub struct WeekReport {
    pub week: u32,
    pub released: u128,
    pub claimed: u128,
}

#[derive(Debug, Serialize)]
pub struct ParticipantReport {
    pub name: &'static str,
    pub address: Address,
    pub overview: ParticipantOverview,
    pub staking_claimed: u128,
    pub oxs_balance: u128,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FarmingEvent {
    Claim { name: &'static str, week: u32, reward: u128 },
    Withdraw { name: &'static str, week: u32, receipt: WithdrawReceipt },
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub weeks: Vec<WeekReport>,
    pub farming: Vec<FarmingEvent>,
    pub participants: Vec<ParticipantReport>,
    pub snapshot: ProtocolSnapshot,
}

pub struct Scenario {
    protocol: Protocol,
    ledger: Arc<MemoryTokenLedger>,
    clock: ManualClock,
    weeks: u32,
    owner: Address,
    token: TokenId,
    participants: Vec<(&'static str, Address)>,
    pool: PoolId,
}

impl Scenario {
    /// Fund custody, register participants, stake tiers and seed the pool.
    pub fn new(config: &ProtocolConfig, settings: ScenarioSettings) -> Result<Self> {
        let ledger = Arc::new(MemoryTokenLedger::new());
        let clock = ManualClock::new(settings.start);
        let owner = Address::from_label("oxs/owner");
        let token = Address::from_label("OXS");
        let accounts = ProtocolAccounts::with_labelled_custody(owner, token);

        ledger.mint(&token, &accounts.staking_custody, config.staking.emission_budget());
        ledger.mint(
            &token,
            &accounts.farming_custody,
            settings.farming_budget_oxs as u128 * ONE_OXS,
        );

        let mut protocol = Protocol::new(config, accounts, ledger.clone(), Arc::new(clock.clone()))?;

        let participants: Vec<(&'static str, Address)> = PARTICIPANTS
            .iter()
            .map(|p| (p.0, Address::from_label(p.0)))
            .collect();
        let addresses: Vec<Address> = participants.iter().map(|(_, a)| *a).collect();
        let amounts: Vec<u128> = PARTICIPANTS.iter().map(|p| p.2 as u128 * ONE_OXS).collect();
        let productivities: Vec<u32> = PARTICIPANTS.iter().map(|p| p.3).collect();
        let locks: Vec<u32> = PARTICIPANTS.iter().map(|p| p.4).collect();
        let added = protocol
            .staking_mut()
            .add_eligible_claimers(&owner, &addresses, &amounts, &productivities, &locks)?;
        debug!(added, "participants registered");

        let (usdc, weth) = (Address::from_label("USDC"), Address::from_label("WETH"));
        let pool = protocol.create_pool(&owner, usdc, weth)?;

        for (row, (name, addr)) in PARTICIPANTS.iter().zip(&participants) {
            let tier_stake = row.1 as u128 * ONE_OXS;
            if tier_stake > 0 {
                ledger.mint(&token, addr, tier_stake);
                ledger.approve(&token, addr, &accounts.tier_custody, tier_stake);
                let tier = protocol.tiers_mut().update_user_stake(addr, *addr, tier_stake)?;
                debug!(name, tier, "tier stake placed");
            }
            let leg = row.5 as u128 * ONE_OXS;
            if leg > 0 {
                for leg_token in [usdc, weth] {
                    ledger.mint(&leg_token, addr, leg);
                    ledger.approve(&leg_token, addr, &accounts.farming_custody, leg);
                }
                protocol.farming_mut().deposit_liquidity(addr, pool, leg, leg)?;
            }
        }

        Ok(Self {
            protocol,
            ledger,
            clock,
            weeks: settings.weeks,
            owner,
            token,
            participants,
            pool,
        })
    }

    fn address_of(&self, name: &str) -> Address {
        self.participants
            .iter()
            .find(|(n, _)| *n == name)
            .map_or(Address::ZERO, |(_, a)| *a)
    }

    /// Claim farming rewards, treating an empty accrual as no event.
    fn farm_claim(&mut self, name: &'static str, week: u32) -> Result<Option<FarmingEvent>> {
        let user = self.address_of(name);
        match self.protocol.farming_mut().claim_rewards(&user, self.pool) {
            Ok(reward) => Ok(Some(FarmingEvent::Claim { name, week, reward })),
            Err(FarmingError::NothingToClaim) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn run(&mut self) -> Result<Report> {
        let mut weeks = Vec::with_capacity(self.weeks as usize);
        let mut farming = Vec::new();

        for step in 0..self.weeks {
            let owner = self.owner;
            let released = self.protocol.staking_mut().release_current_week(&owner)?;
            let week = self.protocol.staking().current_week();
            let mut claimed = 0;
            // carol batches her claims at the end.
            for name in ["alice", "bob"] {
                let user = self.address_of(name);
                claimed += self.protocol.staking_mut().claim(&user, week)?;
            }
            info!(week, released, claimed, "week settled");
            weeks.push(WeekReport { week, released, claimed });

            if step > 0 && step == self.weeks / 2 {
                farming.extend(self.farm_claim("alice", week)?);
            }
            self.clock.advance(SECONDS_PER_WEEK);
        }

        let final_week = self.protocol.staking().current_week();
        if self.weeks > 0 {
            let carol = self.address_of("carol");
            let all: Vec<u32> = weeks.iter().map(|w| w.week).collect();
            let batch = self.protocol.staking_mut().claim_many(&carol, &all)?;
            info!(amount = batch, weeks = all.len(), "batched claim");
        }

        let bob = self.address_of("bob");
        if let Some(position) = self.protocol.farming().position(&bob, self.pool).cloned() {
            if position.active {
                let receipt = self
                    .protocol
                    .farming_mut()
                    .withdraw_liquidity(&bob, self.pool, position.liquidity / 2)?;
                farming.push(FarmingEvent::Withdraw { name: "bob", week: final_week, receipt });
            }
        }
        farming.extend(self.farm_claim("alice", final_week)?);

        let participants = self
            .participants
            .iter()
            .map(|&(name, address)| ParticipantReport {
                name,
                address,
                overview: self.protocol.participant_overview(&address),
                staking_claimed: self
                    .protocol
                    .staking()
                    .participant_details(&address)
                    .map_or(0, |d| d.total_claimed),
                oxs_balance: self.ledger.balance_of(&self.token, &address),
            })
            .collect();

        Ok(Report {
            weeks,
            farming,
            participants,
            snapshot: self.protocol.snapshot(),
        })
    }
}
