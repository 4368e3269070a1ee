//! Protocol configuration.
//!
//! Layering, lowest to highest precedence:
//! 1. built-in defaults ([`ProtocolConfig::default`])
//! 2. a TOML file (explicit path, or `<config dir>/oxs/oxs.toml` if present)
//! 3. environment variables `OXS__<SECTION>__<KEY>`, e.g.
//!    `OXS__FARMING__PROTOCOL_FEE_BPS=150`
//!
//! Amounts are whole OXS or basis points so every value fits a TOML integer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use oxs_core::EmissionCurve;
use oxs_farming::{FarmingConfig, PoolParams};
use oxs_staking::StakingConfig;
use oxs_tier::TierConfig;

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "OXS";
pub const ENV_SEPARATOR: &str = "__";

/// Economics applied to pools created without explicit parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolTemplate {
    pub base_apy_bps: u32,
    pub max_multiplier: u32,
    pub fee_initial_bps: u32,
    pub fee_final_bps: u32,
    pub vesting_weeks: u32,
}

impl Default for PoolTemplate {
    fn default() -> Self {
        let p = PoolParams::default();
        Self {
            base_apy_bps: p.base_apy_bps as u32,
            max_multiplier: p.max_multiplier as u32,
            fee_initial_bps: p.fee_initial_bps as u32,
            fee_final_bps: p.fee_final_bps as u32,
            vesting_weeks: p.vesting_weeks,
        }
    }
}

impl PoolTemplate {
    pub fn params(&self) -> PoolParams {
        PoolParams {
            base_apy_bps: self.base_apy_bps as u128,
            max_multiplier: self.max_multiplier as u128,
            fee_initial_bps: self.fee_initial_bps as u128,
            fee_final_bps: self.fee_final_bps as u128,
            vesting_weeks: self.vesting_weeks,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub staking: StakingConfig,
    pub tier: TierConfig,
    pub farming: FarmingConfig,
    pub pool: PoolTemplate,
}

impl ProtocolConfig {
    /// Load from `path` (required when given) or the default location
    /// (optional), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) but reads environment overrides from `env`
    /// instead of the process environment when it is `Some`.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(default) = default_config_path() {
                    debug!(path = %default.display(), "checking default config location");
                    builder = builder.add_source(File::from(default).format(FileFormat::Toml).required(false));
                }
            }
        }
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env);
        let config: Self = builder.add_source(environment).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engines would refuse at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        EmissionCurve::new(self.staking.emission_budget())?;
        self.tier.build_curve()?;
        self.farming.validate()?;
        self.pool.params().validate()?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Render(e.to_string()))
    }
}

/// `<config dir>/oxs/oxs.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("oxs").join("oxs.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxs_core::error::{FarmingError, TierError};
    use oxs_staking::ClaimWeightPolicy;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("oxs.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn defaults_are_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tier.tiers.len(), 3);
        assert_eq!(config.staking.emission_budget_oxs, 10_000_000);
        assert_eq!(config.farming.max_pools_per_user, 10);
    }

    #[test]
    fn empty_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "");
        let config = ProtocolConfig::load_with_env(Some(&path), no_env()).unwrap();
        assert_eq!(config, ProtocolConfig::default());
    }

    #[test]
    fn file_overrides_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"
[staking]
emission_budget_oxs = 5000000
claim_weight_policy = "current"

[farming]
protocol_fee_bps = 250

[tier]
max_tiers = 2

[[tier.tiers]]
name = "Bronze"
required_oxs = 100
cash_value = 10
base_conversion_rate = 600

[[tier.tiers]]
name = "Silver"
required_oxs = 500
cash_value = 60
base_conversion_rate = 650
"#,
        );
        let config = ProtocolConfig::load_with_env(Some(&path), no_env()).unwrap();
        assert_eq!(config.staking.emission_budget_oxs, 5_000_000);
        assert_eq!(config.staking.claim_weight_policy, ClaimWeightPolicy::Current);
        assert_eq!(config.farming.protocol_fee_bps, 250);
        assert_eq!(config.farming.min_deposit, FarmingConfig::default().min_deposit);
        assert_eq!(config.tier.tiers[1].name, "Silver");
    }

    #[test]
    fn environment_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[farming]\nprotocol_fee_bps = 250\n");
        let env = HashMap::from([
            ("OXS__FARMING__PROTOCOL_FEE_BPS".to_string(), "150".to_string()),
            ("OXS__POOL__VESTING_WEEKS".to_string(), "26".to_string()),
        ]);
        let config = ProtocolConfig::load_with_env(Some(&path), Some(env)).unwrap();
        assert_eq!(config.farming.protocol_fee_bps, 150);
        assert_eq!(config.pool.vesting_weeks, 26);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            ProtocolConfig::load_with_env(Some(&path), no_env()),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn fee_cap_enforced_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[farming]\nprotocol_fee_bps = 2500\n");
        assert_eq!(
            ProtocolConfig::load_with_env(Some(&path), no_env()),
            Err(ConfigError::Farming(FarmingError::FeeTooHigh { fee: 2_500, max: 2_000 }))
        );
    }

    #[test]
    fn unordered_tiers_rejected() {
        let mut config = ProtocolConfig::default();
        config.tier.tiers.swap(0, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Tier(TierError::ThresholdNotIncreasing { tier: 2, .. }))
        ));
    }

    #[test]
    fn max_tiers_above_cap_rejected() {
        let mut config = ProtocolConfig::default();
        config.tier.max_tiers = 11;
        assert!(matches!(config.validate(), Err(ConfigError::Tier(TierError::InvalidMaxTiers { .. }))));
    }

    #[test]
    fn inverted_fee_schedule_rejected() {
        let mut config = ProtocolConfig::default();
        config.pool.fee_initial_bps = 10;
        config.pool.fee_final_bps = 100;
        assert!(matches!(config.validate(), Err(ConfigError::Farming(FarmingError::InvalidFeeSchedule { .. }))));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = ProtocolConfig::default();
        config.staking.emission_budget_oxs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Curve(_))));
    }

    #[test]
    fn toml_rendering_reloads() {
        let rendered = ProtocolConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[farming]"));
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, &rendered);
        let reloaded = ProtocolConfig::load_with_env(Some(&path), no_env()).unwrap();
        assert_eq!(reloaded, ProtocolConfig::default());
    }
}
