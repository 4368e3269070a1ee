//! Shared helpers for end-to-end and adversarial tests.

use std::sync::Arc;

use oxs_core::constants::ONE_OXS;
use oxs_core::{Address, ManualClock, MemoryTokenLedger, TokenId};
use oxs_protocol::{Protocol, ProtocolAccounts, ProtocolConfig};

/// Clock start for every scenario.
pub const START: u64 = 1_700_000_000;

/// Reward tokens funded into farming custody.
pub const FARMING_BUDGET: u128 = 1_000_000 * ONE_OXS;

pub fn addr(label: &str) -> Address {
    Address::from_label(label)
}

pub fn oxs(whole: u128) -> u128 {
    whole * ONE_OXS
}

/// A composed protocol on an in-memory ledger and manual clock, with the
/// staking reserve funded to the full emission budget.
pub struct World {
    pub protocol: Protocol,
    pub ledger: Arc<MemoryTokenLedger>,
    pub clock: ManualClock,
    pub accounts: ProtocolAccounts,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(&ProtocolConfig::default())
    }

    pub fn with_config(config: &ProtocolConfig) -> Self {
        let ledger = Arc::new(MemoryTokenLedger::new());
        let clock = ManualClock::new(START);
        let accounts = ProtocolAccounts::with_labelled_custody(addr("owner"), addr("OXS"));
        ledger.mint(&accounts.token, &accounts.staking_custody, config.staking.emission_budget());
        ledger.mint(&accounts.token, &accounts.farming_custody, FARMING_BUDGET);
        let protocol = Protocol::new(config, accounts, ledger.clone(), Arc::new(clock.clone()))
            .expect("default world must assemble");
        Self { protocol, ledger, clock, accounts }
    }

    pub fn owner(&self) -> Address {
        self.accounts.owner
    }

    pub fn token(&self) -> TokenId {
        self.accounts.token
    }

    /// Mint `amount` of `token` to `user` and approve `spender` for it.
    pub fn fund(&self, user: &Address, token: &TokenId, spender: &Address, amount: u128) {
        self.ledger.mint(token, user, amount);
        self.ledger.approve(token, user, spender, amount);
    }

    /// Give `user` OXS and stake it with the tier engine. Returns the tier.
    pub fn stake_tier(&self, user: &Address, amount: u128) -> u8 {
        self.fund(user, &self.accounts.token, &self.accounts.tier_custody, amount);
        self.protocol
            .tiers_mut()
            .update_user_stake(user, *user, amount)
            .expect("tier stake")
    }

    /// Fund both legs of a pool for `user`, approved to farming custody.
    pub fn fund_legs(&self, user: &Address, legs: [TokenId; 2], amount: u128) {
        for leg in legs {
            self.fund(user, &leg, &self.accounts.farming_custody, amount);
        }
    }

    pub fn advance_weeks(&self, weeks: u64) {
        self.clock.advance(weeks * oxs_core::constants::SECONDS_PER_WEEK);
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
