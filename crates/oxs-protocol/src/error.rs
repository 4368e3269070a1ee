//! Protocol-level errors.
use thiserror::Error;

use oxs_core::error::{CurveError, FarmingError, StakingError, TierError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")] Load(String),
    #[error("failed to render configuration: {0}")] Render(String),
    #[error("invalid emission budget: {0}")] Curve(#[from] CurveError),
    #[error("invalid tier table: {0}")] Tier(#[from] TierError),
    #[error("invalid farming settings: {0}")] Farming(#[from] FarmingError),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error(transparent)] Config(#[from] ConfigError),
    #[error(transparent)] Staking(#[from] StakingError),
    #[error(transparent)] Tier(#[from] TierError),
    #[error(transparent)] Farming(#[from] FarmingError),
}
