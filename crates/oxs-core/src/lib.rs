//! # oxs-core
//! Foundation types, curves and collaborator traits for the OXS protocol.
//!
//! All reward and weight math is integer-only so results are reproducible
//! from their inputs alone.

pub mod access;
pub mod constants;
pub mod emission;
pub mod error;
pub mod ledger;
pub mod math;
pub mod traits;
pub mod types;
pub mod weight;

pub use access::AccessControl;
pub use emission::EmissionCurve;
pub use ledger::{ManualClock, MemoryTokenLedger, SystemClock};
pub use traits::{Clock, StakingActivity, TierSource, TokenLedger};
pub use types::{Address, TierId, TokenId};
pub use weight::user_weight;
