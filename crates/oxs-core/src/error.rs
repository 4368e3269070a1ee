//! Error types for the OXS protocol.
use thiserror::Error;

use crate::types::{Address, TierId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow")] Overflow,
    #[error("division by zero")] DivisionByZero,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("caller {0} is not the owner")] NotOwner(Address),
    #[error("caller {caller} may not act for {subject}")] NotAuthorized { caller: Address, subject: Address },
    #[error("invalid (null) address")] InvalidAddress,
    #[error("protocol is paused")] Paused,
    #[error("protocol is not paused")] NotPaused,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    #[error("week {week} exceeds distribution limit {max}")] WeekLimitExceeded { week: u32, max: u32 },
    #[error("emission budget is zero")] EmptyBudget,
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u128, need: u128 },
    #[error("insufficient allowance: have {have}, need {need}")] InsufficientAllowance { have: u128, need: u128 },
    #[error("transfer rejected: {0}")] Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("week {week} exceeds distribution limit {max}")] WeekLimitExceeded { week: u32, max: u32 },
    #[error("tokens already distributed for week {0}")] WeekAlreadyDistributed(u32),
    #[error("week {0} has not been distributed")] WeekNotDistributed(u32),
    #[error("week {week} not reached (current week {current})")] WeekNotReached { week: u32, current: u32 },
    #[error("invalid week range {first}..={last}")] InvalidRange { first: u32, last: u32 },
    #[error("week {week} already claimed by {participant}")] AlreadyClaimed { participant: Address, week: u32 },
    #[error("no tokens available to claim")] NothingToClaim,
    #[error("participant {0} is not eligible")] NotEligible(Address),
    #[error("array length mismatch: {addresses} addresses, {amounts} amounts, {productivities} productivities, {lock_weeks} lock weeks")]
    LengthMismatch { addresses: usize, amounts: usize, productivities: usize, lock_weeks: usize },
    #[error(transparent)] Access(#[from] AccessError),
    #[error(transparent)] Curve(#[from] CurveError),
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Transfer(#[from] TransferError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    #[error("invalid tier {0}")] InvalidTier(TierId),
    #[error("maximum number of tiers ({max}) reached")] MaxTiersReached { max: u8 },
    #[error("max tiers {requested} outside [{min}, {cap}]")] InvalidMaxTiers { requested: u8, min: u8, cap: u8 },
    #[error("tier {tier} threshold {required} breaks strict ordering")] ThresholdNotIncreasing { tier: TierId, required: u128 },
    #[error("range too large: {len} weeks, maximum {max}")] RangeTooLarge { len: u32, max: u32 },
    #[error("final week {week} exceeds {max}")] WeekLimitExceeded { week: u32, max: u32 },
    #[error("invalid week range {from}..={to}")] InvalidRange { from: u32, to: u32 },
    #[error("no stake held for {0}")] NothingStaked(Address),
    #[error(transparent)] Access(#[from] AccessError),
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Transfer(#[from] TransferError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FarmingError {
    #[error("pool {0} does not exist")] PoolNotFound(u64),
    #[error("pool {0} is not active")] PoolInactive(u64),
    #[error("pool tokens must differ")] IdenticalTokens,
    #[error("invalid token address")] InvalidToken,
    #[error("fee schedule invalid: initial {initial} < final {final_fee} or above {max}")] InvalidFeeSchedule { initial: u128, final_fee: u128, max: u128 },
    #[error("max multiplier {0} below 1.0x")] InvalidMultiplier(u128),
    #[error("minimum amounts not reached: each leg needs {min}")] BelowMinimumDeposit { min: u128 },
    #[error("insufficient liquidity: have {have}, need {need}")] InsufficientLiquidity { have: u128, need: u128 },
    #[error("{participant} is not active in pool {pool}")] NotActiveInPool { participant: Address, pool: u64 },
    #[error("protocol fee {fee} exceeds maximum {max}")] FeeTooHigh { fee: u128, max: u128 },
    #[error("participant already active in {max} pools")] TooManyPools { max: usize },
    #[error("no rewards to claim")] NothingToClaim,
    #[error("zero amount")] ZeroAmount,
    #[error("payout to {recipient} interrupted ({cause}); unpaid amounts credited as owed")] PayoutDeferred { recipient: Address, cause: TransferError },
    #[error("deposit failed; refund of {amount} to {depositor} credited as owed ({cause})")] RefundDeferred { depositor: Address, amount: u128, cause: TransferError },
    #[error(transparent)] Access(#[from] AccessError),
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Transfer(#[from] TransferError),
}
