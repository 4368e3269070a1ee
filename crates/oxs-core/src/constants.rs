//! Protocol constants. All token amounts are in base units (1 OXS = 10^18).

/// One whole OXS token in base units.
pub const ONE_OXS: u128 = 1_000_000_000_000_000_000;

/// Fixed total supply of the OXS token.
pub const TOTAL_SUPPLY: u128 = 62_500_000 * ONE_OXS;

/// Default amount reserved for weekly staking emission across the whole schedule.
pub const DEFAULT_EMISSION_BUDGET: u128 = 10_000_000 * ONE_OXS;

/// Last week index of the emission schedule (weeks `0..=MAX_WEEK`).
pub const MAX_WEEK: u32 = 727;

/// Number of weeks in the emission schedule.
pub const SCHEDULE_WEEKS: u32 = MAX_WEEK + 1;

pub const SECONDS_PER_WEEK: u64 = 7 * 24 * 60 * 60;
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Productivity is a percentage; inputs above this are clamped.
pub const MAX_PRODUCTIVITY: u32 = 100;

/// Lock duration cap in weeks; inputs above this are clamped.
pub const MAX_LOCK_WEEKS: u32 = 104;

/// Additive base of the productivity factor: `(PRODUCTIVITY_BASE + p)` spans 1.0x..2.0x.
pub const PRODUCTIVITY_BASE: u128 = 100;

/// Additive base of the lock factor: `(LOCK_BASE + l)` spans 1.0x..2.0x.
pub const LOCK_BASE: u128 = 104;

/// Multiplier scale: 1_000 = 1.0x.
pub const MULTIPLIER_PRECISION: u128 = 1_000;

/// Basis point scale for fees, APY and bonuses: 10_000 = 100%.
pub const BPS_PRECISION: u128 = 10_000;

/// Fractional bits of the Q32 fixed-point logarithm.
pub const LOG_FRACTION_BITS: u32 = 32;

/// Default number of tiers a tier table may hold.
pub const DEFAULT_MAX_TIERS: u8 = 3;

/// Absolute ceiling for `max_tiers`.
pub const TIER_HARD_CAP: u8 = 10;

/// Week at which the conversion progression curve saturates.
pub const MAX_PROGRESSION_WEEK: u32 = 104;

/// Longest range a single progression query may return.
pub const MAX_PROGRESSION_RANGE: u32 = 50;

/// Protocol fee ceiling in basis points (20%).
pub const MAX_PROTOCOL_FEE_BPS: u128 = 2_000;

/// Smallest accepted amount for each leg of a liquidity deposit.
pub const MIN_DEPOSIT_AMOUNT: u128 = 1_000;

/// Maximum number of pools a single participant may be active in.
pub const MAX_POOLS_PER_USER: usize = 10;

/// Tier multiplier increment per tier level (1_000 scale).
pub const TIER_MULTIPLIER_STEP: u128 = 250;

/// Staking bonus applied when the participant has active staking (1.2x).
pub const STAKING_BONUS_ACTIVE: u128 = 1_200;
