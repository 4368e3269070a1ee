//! Owner gating and the pause circuit breaker.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AccessError;
use crate::types::Address;

/// Stored owner identity plus a global pause flag.
///
/// Policy is explicit: owner-only operations compare the caller against the
/// owner; self-service operations accept the owner or the subject itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    paused: bool,
}

impl AccessControl {
    pub fn new(owner: Address) -> Result<Self, AccessError> {
        ensure_valid_address(&owner)?;
        Ok(Self { owner, paused: false })
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<(), AccessError> {
        if *caller != self.owner {
            warn!(%caller, "privileged call rejected");
            return Err(AccessError::NotOwner(*caller));
        }
        Ok(())
    }

    pub fn ensure_owner_or_self(&self, caller: &Address, subject: &Address) -> Result<(), AccessError> {
        if *caller == self.owner || caller == subject {
            return Ok(());
        }
        warn!(%caller, %subject, "self-service call rejected");
        Err(AccessError::NotAuthorized { caller: *caller, subject: *subject })
    }

    pub fn ensure_not_paused(&self) -> Result<(), AccessError> {
        if self.paused {
            return Err(AccessError::Paused);
        }
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), AccessError> {
        self.ensure_owner(caller)?;
        if self.paused {
            return Err(AccessError::Paused);
        }
        self.paused = true;
        info!("paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), AccessError> {
        self.ensure_owner(caller)?;
        if !self.paused {
            return Err(AccessError::NotPaused);
        }
        self.paused = false;
        info!("unpaused");
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), AccessError> {
        self.ensure_not_paused()?;
        self.ensure_owner(caller)?;
        ensure_valid_address(&new_owner)?;
        info!(from = %self.owner, to = %new_owner, "ownership transferred");
        self.owner = new_owner;
        Ok(())
    }
}

/// Reject the null identity.
pub fn ensure_valid_address(addr: &Address) -> Result<(), AccessError> {
    if addr.is_zero() {
        return Err(AccessError::InvalidAddress);
    }
    Ok(())
}
