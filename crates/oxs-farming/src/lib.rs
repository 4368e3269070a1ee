//! # oxs-farming
//! Liquidity pools whose rewards compose the participant's tier, their
//! staking activity and the age of their position.
//!
//! - [`composer`]: multiplier, reward and exit fee math
//! - [`pool`]: pool and position bookkeeping
//! - [`engine`]: [`FarmingEngine`], deposits, withdrawals, claims and pool administration

pub mod composer;
pub mod engine;
pub mod pool;

pub use composer::{Multipliers, RewardBreakdown};
pub use engine::{FarmingConfig, FarmingEngine, ProtocolStats, WithdrawReceipt};
pub use pool::{Pool, PoolId, PoolParams, UserPosition};
