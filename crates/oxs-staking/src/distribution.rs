//! Per-week distribution records.
//!
//! A week is released at most once. The record keeps the released amount,
//! the total eligible weight at release time and each eligible participant's
//! weight at that moment, plus how much of the week has been paid out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use oxs_core::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyDistribution {
    pub week: u32,
    pub released_amount: u128,
    pub total_weight_snapshot: u128,
    pub released_at: u64,
    /// Sum of all claims paid against this week.
    pub claimed_amount: u128,
}

impl WeeklyDistribution {
    /// Amount of the week not yet paid out.
    pub fn unpaid(&self) -> u128 {
        self.released_amount.saturating_sub(self.claimed_amount)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionLedger {
    weeks: BTreeMap<u32, WeeklyDistribution>,
    snapshots: BTreeMap<u32, BTreeMap<Address, u128>>,
}

impl DistributionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self, week: u32) -> bool {
        self.weeks.contains_key(&week)
    }

    pub fn get(&self, week: u32) -> Option<&WeeklyDistribution> {
        self.weeks.get(&week)
    }

    /// Record a release. Callers check [`is_released`](Self::is_released)
    /// first; an existing record is never overwritten.
    pub fn record(&mut self, dist: WeeklyDistribution, snapshot: BTreeMap<Address, u128>) -> bool {
        if self.weeks.contains_key(&dist.week) {
            return false;
        }
        self.snapshots.insert(dist.week, snapshot);
        self.weeks.insert(dist.week, dist);
        true
    }

    /// Participant weight captured when `week` was released.
    pub fn snapshot_weight(&self, week: u32, participant: &Address) -> u128 {
        self.snapshots
            .get(&week)
            .and_then(|s| s.get(participant))
            .copied()
            .unwrap_or(0)
    }

    pub fn add_claimed(&mut self, week: u32, amount: u128) {
        if let Some(d) = self.weeks.get_mut(&week) {
            d.claimed_amount = d.claimed_amount.saturating_add(amount);
        }
    }

    pub fn sub_claimed(&mut self, week: u32, amount: u128) {
        if let Some(d) = self.weeks.get_mut(&week) {
            d.claimed_amount = d.claimed_amount.saturating_sub(amount);
        }
    }

    /// Released weeks in ascending order.
    pub fn history(&self) -> impl Iterator<Item = &WeeklyDistribution> {
        self.weeks.values()
    }

    /// Total of released amounts not yet paid out.
    pub fn outstanding(&self) -> u128 {
        self.weeks.values().map(WeeklyDistribution::unpaid).sum()
    }

    pub fn released_count(&self) -> usize {
        self.weeks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(week: u32, amount: u128) -> WeeklyDistribution {
        WeeklyDistribution {
            week,
            released_amount: amount,
            total_weight_snapshot: 10,
            released_at: 0,
            claimed_amount: 0,
        }
    }

    #[test]
    fn record_is_write_once() {
        let mut ledger = DistributionLedger::new();
        assert!(ledger.record(dist(3, 100), BTreeMap::new()));
        assert!(!ledger.record(dist(3, 999), BTreeMap::new()));
        assert_eq!(ledger.get(3).unwrap().released_amount, 100);
    }

    #[test]
    fn history_is_ordered() {
        let mut ledger = DistributionLedger::new();
        ledger.record(dist(5, 1), BTreeMap::new());
        ledger.record(dist(1, 1), BTreeMap::new());
        ledger.record(dist(3, 1), BTreeMap::new());
        let weeks: Vec<u32> = ledger.history().map(|d| d.week).collect();
        assert_eq!(weeks, vec![1, 3, 5]);
    }

    #[test]
    fn snapshot_lookup() {
        let mut ledger = DistributionLedger::new();
        let alice = Address::from_label("alice");
        ledger.record(dist(0, 1), BTreeMap::from([(alice, 42)]));
        assert_eq!(ledger.snapshot_weight(0, &alice), 42);
        assert_eq!(ledger.snapshot_weight(0, &Address::from_label("bob")), 0);
        assert_eq!(ledger.snapshot_weight(1, &alice), 0);
    }

    #[test]
    fn outstanding_tracks_claims() {
        let mut ledger = DistributionLedger::new();
        ledger.record(dist(0, 100), BTreeMap::new());
        ledger.record(dist(1, 50), BTreeMap::new());
        ledger.add_claimed(0, 30);
        assert_eq!(ledger.outstanding(), 120);
        ledger.sub_claimed(0, 30);
        assert_eq!(ledger.outstanding(), 150);
    }
}
