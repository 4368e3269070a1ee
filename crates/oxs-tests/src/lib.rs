//! Cross-crate test suite for the OXS protocol.
//!
//! End-to-end scenarios drive the composed protocol through whole emission
//! schedules; adversarial tests attack the accounting invariants with
//! randomized inputs and failing collaborators.

pub mod helpers;
