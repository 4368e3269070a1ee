//! Claim records and pro-rata share computation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use oxs_core::Address;
use oxs_core::error::MathError;
use oxs_core::math::mul_div;

/// Which participant weight is used as the numerator of a claim.
///
/// The denominator is always the total eligible weight captured at release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimWeightPolicy {
    /// Weight the participant had when the week was released.
    #[default]
    DistributionSnapshot,
    /// Weight the participant has when claiming. Shares are clamped to the
    /// week's unpaid remainder.
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub paid: u128,
    pub claimed_at: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimLedger {
    records: HashMap<(Address, u32), ClaimRecord>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_claimed(&self, participant: &Address, week: u32) -> bool {
        self.records.contains_key(&(*participant, week))
    }

    pub fn get(&self, participant: &Address, week: u32) -> Option<&ClaimRecord> {
        self.records.get(&(*participant, week))
    }

    /// Mark `(participant, week)` claimed. Returns `false` if already marked.
    pub fn mark(&mut self, participant: Address, week: u32, record: ClaimRecord) -> bool {
        if self.has_claimed(&participant, week) {
            return false;
        }
        self.records.insert((participant, week), record);
        true
    }

    /// Undo a mark after the payout transfer failed.
    pub(crate) fn unmark(&mut self, participant: &Address, week: u32) {
        self.records.remove(&(*participant, week));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `floor(released * weight / total_weight)`, clamped to `unpaid`.
///
/// A zero total weight yields a zero share.
pub fn pro_rata_share(
    released: u128,
    weight: u128,
    total_weight: u128,
    unpaid: u128,
) -> Result<u128, MathError> {
    if total_weight == 0 || weight == 0 {
        return Ok(0);
    }
    Ok(mul_div(released, weight, total_weight)?.min(unpaid))
}
