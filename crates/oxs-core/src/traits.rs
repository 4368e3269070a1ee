//! Collaborator interfaces consumed by the OXS engines.
//!
//! - [`TokenLedger`]: balances, allowances and transfers (external token)
//! - [`Clock`]: non-decreasing timestamp source
//! - [`TierSource`]: tier classification of a participant (oxs-tier implements)
//! - [`StakingActivity`]: staking signal for a participant (oxs-staking implements)

use parking_lot::RwLock;

use crate::error::TransferError;
use crate::types::{Address, TierId, TokenId};

/// Fungible token ledger.
///
/// Engines hold tokens in a custody address of their own and move them with
/// [`transfer`](Self::transfer); pull-based deposits go through
/// [`transfer_from`](Self::transfer_from) against a prior allowance.
/// Any failure is a hard error for the calling operation.
///
/// [`check_transfer`](Self::check_transfer) and
/// [`check_transfer_from`](Self::check_transfer_from) are dry runs used before
/// multi-leg movements. The defaults only look at balances and allowances;
/// ledgers with further refusal rules should override them.
pub trait TokenLedger: Send + Sync {
    fn balance_of(&self, token: &TokenId, holder: &Address) -> u128;

    fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> u128;

    /// Move `amount` from `from` to `to`.
    fn transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Move `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Whether [`transfer`](Self::transfer) would succeed right now.
    fn check_transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        if to.is_zero() {
            return Err(TransferError::Rejected("transfer to null address".into()));
        }
        let have = self.balance_of(token, from);
        if have < amount {
            return Err(TransferError::InsufficientBalance { have, need: amount });
        }
        Ok(())
    }

    /// Whether [`transfer_from`](Self::transfer_from) would succeed right now.
    fn check_transfer_from(
        &self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let have = self.allowance(token, from, spender);
        if have < amount {
            return Err(TransferError::InsufficientAllowance { have, need: amount });
        }
        self.check_transfer(token, from, to, amount)
    }
}

/// Timestamp source in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Tier classification of a participant. `0` means no tier.
pub trait TierSource: Send + Sync {
    fn tier_of_user(&self, user: &Address) -> TierId;
}

/// Whether a participant currently has active staking.
pub trait StakingActivity: Send + Sync {
    fn has_active_staking(&self, user: &Address) -> bool;
}

impl<T: TierSource> TierSource for RwLock<T> {
    fn tier_of_user(&self, user: &Address) -> TierId {
        self.read().tier_of_user(user)
    }
}

impl<T: StakingActivity> StakingActivity for RwLock<T> {
    fn has_active_staking(&self, user: &Address) -> bool {
        self.read().has_active_staking(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    // ------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------

    struct FixedTiers(HashMap<Address, TierId>);

    impl TierSource for FixedTiers {
        fn tier_of_user(&self, user: &Address) -> TierId {
            self.0.get(user).copied().unwrap_or(0)
        }
    }

    struct Stakers(Vec<Address>);

    impl StakingActivity for Stakers {
        fn has_active_staking(&self, user: &Address) -> bool {
            self.0.contains(user)
        }
    }

    struct FrozenClock(u64);

    impl Clock for FrozenClock {
        fn now(&self) -> u64 {
            self.0
        }
    }

    struct RejectingLedger;

    impl TokenLedger for RejectingLedger {
        fn balance_of(&self, _token: &TokenId, _holder: &Address) -> u128 {
            0
        }

        fn allowance(&self, _token: &TokenId, _owner: &Address, _spender: &Address) -> u128 {
            0
        }

        fn transfer(&self, _: &TokenId, _: &Address, _: &Address, _: u128) -> Result<(), TransferError> {
            Err(TransferError::Rejected("frozen".into()))
        }

        fn transfer_from(
            &self,
            _: &TokenId,
            _: &Address,
            _: &Address,
            _: &Address,
            _: u128,
        ) -> Result<(), TransferError> {
            Err(TransferError::Rejected("frozen".into()))
        }
    }

    #[test]
    fn traits_are_object_safe() {
        let alice = Address::from_label("alice");
        let tiers: Arc<dyn TierSource> = Arc::new(FixedTiers(HashMap::from([(alice, 2)])));
        let staking: Arc<dyn StakingActivity> = Arc::new(Stakers(vec![alice]));
        let clock: Box<dyn Clock> = Box::new(FrozenClock(42));
        let ledger: Box<dyn TokenLedger> = Box::new(RejectingLedger);

        assert_eq!(tiers.tier_of_user(&alice), 2);
        assert_eq!(tiers.tier_of_user(&Address::ZERO), 0);
        assert!(staking.has_active_staking(&alice));
        assert_eq!(clock.now(), 42);
        assert!(ledger.transfer(&alice, &alice, &alice, 1).is_err());
    }

    #[test]
    fn default_checks_use_balance_and_allowance() {
        let alice = Address::from_label("alice");
        let ledger = RejectingLedger;
        assert_eq!(
            ledger.check_transfer(&alice, &alice, &alice, 1),
            Err(TransferError::InsufficientBalance { have: 0, need: 1 })
        );
        assert_eq!(
            ledger.check_transfer_from(&alice, &alice, &alice, &alice, 1),
            Err(TransferError::InsufficientAllowance { have: 0, need: 1 })
        );
        assert!(ledger.check_transfer(&alice, &alice, &Address::ZERO, 0).is_err());
        assert!(ledger.check_transfer(&alice, &alice, &alice, 0).is_ok());
    }

    #[test]
    fn rwlock_wrappers_delegate() {
        let alice = Address::from_label("alice");
        let shared = Arc::new(RwLock::new(FixedTiers(HashMap::new())));
        let as_source: Arc<dyn TierSource> = shared.clone();
        assert_eq!(as_source.tier_of_user(&alice), 0);

        shared.write().0.insert(alice, 3);
        assert_eq!(as_source.tier_of_user(&alice), 3);

        let stakers: Arc<dyn StakingActivity> = Arc::new(RwLock::new(Stakers(vec![])));
        assert!(!stakers.has_active_staking(&alice));
    }
}
