//! In-memory token ledger and clocks.
//!
//! [`MemoryTokenLedger`] backs the simulator and every test. [`ManualClock`]
//! lets scenarios advance time deterministically; [`SystemClock`] reads the
//! wall clock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TransferError;
use crate::traits::{Clock, TokenLedger};
use crate::types::{Address, TokenId};

#[derive(Debug, Default)]
struct LedgerInner {
    balances: HashMap<(TokenId, Address), u128>,
    allowances: HashMap<(TokenId, Address, Address), u128>,
    /// Holders whose outgoing transfers are refused.
    frozen: Vec<Address>,
    /// Tokens that refuse every transfer.
    frozen_tokens: Vec<TokenId>,
}

impl LedgerInner {
    fn balance(&self, token: &TokenId, holder: &Address) -> u128 {
        self.balances.get(&(*token, *holder)).copied().unwrap_or(0)
    }

    fn check_move(&self, token: &TokenId, from: &Address, to: &Address, amount: u128) -> Result<(), TransferError> {
        if to.is_zero() {
            return Err(TransferError::Rejected("transfer to null address".into()));
        }
        if self.frozen_tokens.contains(token) {
            return Err(TransferError::Rejected(format!("token {token} is frozen")));
        }
        if self.frozen.contains(from) {
            return Err(TransferError::Rejected(format!("holder {from} is frozen")));
        }
        let have = self.balance(token, from);
        if have < amount {
            return Err(TransferError::InsufficientBalance { have, need: amount });
        }
        Ok(())
    }

    fn check_allowance(&self, token: &TokenId, spender: &Address, from: &Address, amount: u128) -> Result<u128, TransferError> {
        let have = self.allowances.get(&(*token, *from, *spender)).copied().unwrap_or(0);
        if have < amount {
            return Err(TransferError::InsufficientAllowance { have, need: amount });
        }
        Ok(have)
    }

    fn move_balance(
        &mut self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.check_move(token, from, to, amount)?;
        let have = self.balance(token, from);
        let to_balance = self.balance(token, to);
        if from != to {
            let credited = to_balance
                .checked_add(amount)
                .ok_or_else(|| TransferError::Rejected("balance overflow".into()))?;
            self.balances.insert((*token, *from), have - amount);
            self.balances.insert((*token, *to), credited);
        }
        Ok(())
    }
}

/// Thread-safe in-memory ledger for any number of tokens.
#[derive(Debug, Default)]
pub struct MemoryTokenLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `token` to `to` out of thin air.
    pub fn mint(&self, token: &TokenId, to: &Address, amount: u128) {
        let mut inner = self.inner.lock();
        let entry = inner.balances.entry((*token, *to)).or_insert(0);
        *entry = entry.saturating_add(amount);
        debug!(%token, %to, amount, "minted");
    }

    /// Set `spender`'s allowance over `owner`'s `token` balance.
    pub fn approve(&self, token: &TokenId, owner: &Address, spender: &Address, amount: u128) {
        self.inner.lock().allowances.insert((*token, *owner, *spender), amount);
    }

    /// Refuse every outgoing transfer from `holder`. Used to exercise
    /// collaborator failures.
    pub fn freeze(&self, holder: &Address) {
        let mut inner = self.inner.lock();
        if !inner.frozen.contains(holder) {
            inner.frozen.push(*holder);
        }
    }

    pub fn unfreeze(&self, holder: &Address) {
        self.inner.lock().frozen.retain(|a| a != holder);
    }

    /// Refuse every transfer of `token`, whoever holds it.
    pub fn freeze_token(&self, token: &TokenId) {
        let mut inner = self.inner.lock();
        if !inner.frozen_tokens.contains(token) {
            inner.frozen_tokens.push(*token);
        }
    }

    pub fn unfreeze_token(&self, token: &TokenId) {
        self.inner.lock().frozen_tokens.retain(|t| t != token);
    }
}

impl TokenLedger for MemoryTokenLedger {
    fn balance_of(&self, token: &TokenId, holder: &Address) -> u128 {
        self.inner.lock().balance(token, holder)
    }

    fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> u128 {
        self.inner
            .lock()
            .allowances
            .get(&(*token, *owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.inner.lock().move_balance(token, from, to, amount)
    }

    fn transfer_from(
        &self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let mut inner = self.inner.lock();
        let have = inner.check_allowance(token, spender, from, amount)?;
        inner.move_balance(token, from, to, amount)?;
        inner.allowances.insert((*token, *from, *spender), have - amount);
        Ok(())
    }

    fn check_transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.inner.lock().check_move(token, from, to, amount)
    }

    fn check_transfer_from(
        &self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let inner = self.inner.lock();
        inner.check_allowance(token, spender, from, amount)?;
        inner.check_move(token, from, to, amount)
    }
}

/// Shared, forward-only clock for deterministic scenarios.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self { now: Arc::new(AtomicU64::new(start)) }
    }

    pub fn advance(&self, secs: u64) {
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| Some(t.saturating_add(secs)));
    }

    /// Move the clock to `ts`. Earlier timestamps are ignored.
    pub fn set(&self, ts: u64) {
        self.now.fetch_max(ts, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock time in UNIX seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}
