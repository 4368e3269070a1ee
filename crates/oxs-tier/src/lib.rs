//! # oxs-tier
//! Stake-threshold tier classification and time-progressive conversion rates.

pub mod engine;
pub mod progression;
pub mod table;

pub use engine::{NO_TIER_NAME, TierConfig, TierEngine, TierSpec, UserTierInfo, UserTierState};
pub use progression::{conversion_rate_at, progression};
pub use table::{TierCurve, TierDefinition};
