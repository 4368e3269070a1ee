//! Ordered tier table.
//!
//! Tier ids are `1..=count`; id `0` means no tier. Thresholds are strictly
//! increasing by id, so the tier of a stake is the highest active id whose
//! threshold the stake meets.

use serde::{Deserialize, Serialize};

use oxs_core::TierId;
use oxs_core::constants::{DEFAULT_MAX_TIERS, ONE_OXS, TIER_HARD_CAP};
use oxs_core::error::TierError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefinition {
    pub id: TierId,
    pub name: String,
    /// Minimum stake in base units.
    pub required_tokens: u128,
    /// Cash-equivalent value of the tier.
    pub cash_value: u128,
    /// Base conversion rate in basis points.
    pub base_conversion_rate: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCurve {
    tiers: Vec<TierDefinition>,
    max_tiers: u8,
}

impl TierCurve {
    /// Empty table accepting up to `max_tiers` tiers.
    pub fn new(max_tiers: u8) -> Result<Self, TierError> {
        check_max_tiers(max_tiers, 0)?;
        Ok(Self { tiers: Vec::new(), max_tiers })
    }

    /// The reference table: Elevator, Premium Elevator and VIP ELEVATOR.
    pub fn with_defaults() -> Self {
        let defaults: [(&str, u128, u128); 3] = [
            ("Elevator", 2_000, 300),
            ("Premium Elevator", 10_000, 1_500),
            ("VIP ELEVATOR", 34_000, 5_100),
        ];
        let tiers = defaults
            .iter()
            .zip(1..)
            .map(|((name, required, cash), id)| TierDefinition {
                id,
                name: (*name).to_string(),
                required_tokens: required * ONE_OXS,
                cash_value: *cash,
                base_conversion_rate: 600,
                active: true,
            })
            .collect();
        Self { tiers, max_tiers: DEFAULT_MAX_TIERS }
    }

    pub fn count(&self) -> u8 {
        self.tiers.len() as u8
    }

    pub fn max_tiers(&self) -> u8 {
        self.max_tiers
    }

    pub fn iter(&self) -> impl Iterator<Item = &TierDefinition> {
        self.tiers.iter()
    }

    pub fn get(&self, id: TierId) -> Result<&TierDefinition, TierError> {
        if id == 0 {
            return Err(TierError::InvalidTier(id));
        }
        self.tiers.get(id as usize - 1).ok_or(TierError::InvalidTier(id))
    }

    /// Highest active tier whose threshold is met, or 0.
    pub fn tier_of(&self, amount: u128) -> TierId {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.active && t.required_tokens <= amount)
            .map_or(0, |t| t.id)
    }

    /// Whether `amount` reaches tier `id` and that tier is active.
    pub fn qualifies_for(&self, amount: u128, id: TierId) -> Result<bool, TierError> {
        let tier = self.get(id)?;
        Ok(tier.active && amount >= tier.required_tokens)
    }

    /// Append a tier above the current highest one.
    pub fn add_tier(
        &mut self,
        name: impl Into<String>,
        required_tokens: u128,
        cash_value: u128,
        base_conversion_rate: u32,
    ) -> Result<TierId, TierError> {
        if self.count() >= self.max_tiers {
            return Err(TierError::MaxTiersReached { max: self.max_tiers });
        }
        let id = self.count() + 1;
        if let Some(top) = self.tiers.last() {
            if required_tokens <= top.required_tokens {
                return Err(TierError::ThresholdNotIncreasing { tier: id, required: required_tokens });
            }
        }
        self.tiers.push(TierDefinition {
            id,
            name: name.into(),
            required_tokens,
            cash_value,
            base_conversion_rate,
            active: true,
        });
        Ok(id)
    }

    /// Replace the parameters of tier `id`, keeping thresholds strictly
    /// ordered against both neighbours.
    pub fn update_tier(
        &mut self,
        id: TierId,
        name: impl Into<String>,
        required_tokens: u128,
        cash_value: u128,
        base_conversion_rate: u32,
    ) -> Result<(), TierError> {
        self.get(id)?;
        let idx = id as usize - 1;
        let below_ok = idx == 0 || self.tiers[idx - 1].required_tokens < required_tokens;
        let above_ok = self
            .tiers
            .get(idx + 1)
            .is_none_or(|next| required_tokens < next.required_tokens);
        if !below_ok || !above_ok {
            return Err(TierError::ThresholdNotIncreasing { tier: id, required: required_tokens });
        }
        let tier = &mut self.tiers[idx];
        tier.name = name.into();
        tier.required_tokens = required_tokens;
        tier.cash_value = cash_value;
        tier.base_conversion_rate = base_conversion_rate;
        Ok(())
    }

    pub fn set_active(&mut self, id: TierId, active: bool) -> Result<(), TierError> {
        self.get(id)?;
        self.tiers[id as usize - 1].active = active;
        Ok(())
    }

    /// Change the tier limit. Must cover existing tiers and stay under the
    /// hard cap.
    pub fn set_max_tiers(&mut self, max_tiers: u8) -> Result<(), TierError> {
        check_max_tiers(max_tiers, self.count())?;
        self.max_tiers = max_tiers;
        Ok(())
    }
}

impl Default for TierCurve {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn check_max_tiers(requested: u8, count: u8) -> Result<(), TierError> {
    let min = count.max(1);
    if requested < min || requested > TIER_HARD_CAP {
        return Err(TierError::InvalidMaxTiers { requested, min, cap: TIER_HARD_CAP });
    }
    Ok(())
}
