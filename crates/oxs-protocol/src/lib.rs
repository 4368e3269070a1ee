//! # oxs-protocol
//! Layered configuration and the composed protocol: staking, tiers and
//! farming sharing one token ledger and clock.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{PoolTemplate, ProtocolConfig, default_config_path};
pub use error::{ConfigError, ProtocolError};
pub use protocol::{ParticipantOverview, Protocol, ProtocolAccounts, ProtocolSnapshot};
