//! Fund Transfers
//!
//! Moves money between two accounts of the ledger as a single atomic unit of
//! work. One committed transfer writes:
//!
//! - one `transfers` row
//! - two `entries` rows (debit on the sender, credit on the receiver)
//! - two balance updates
//!
//! # Safety Invariants
//!
//! 1. **All or nothing**: any failure rolls back every write of the transfer
//! 2. **Conservation**: the sum of all balances never changes
//! 3. **Lock ordering**: account rows are locked in ascending id order

pub mod engine;
pub mod types;

pub use engine::TransferEngine;
pub use types::{TransferTxParams, TransferTxResult};
