//! # oxs-staking
//! Weekly emission releases and weighted pro-rata claims.
//!
//! - [`registry`]: eligible participants and their weights
//! - [`distribution`]: write-once weekly release records
//! - [`claims`]: per-(participant, week) claim records and share math
//! - [`engine`]: [`StakingEngine`], the owner-gated composition of the above

pub mod claims;
pub mod distribution;
pub mod engine;
pub mod registry;

pub use claims::{ClaimRecord, ClaimWeightPolicy};
pub use distribution::WeeklyDistribution;
pub use engine::{ParticipantDetails, StakingConfig, StakingEngine};
pub use registry::ParticipantProfile;
