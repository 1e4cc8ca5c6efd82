// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap primitives shared by every leg
//!
//! - SHA-256 hash lock primitives and secret generation
//! - Timelocks, chain clocks and refund eligibility
//! - Confirmation depth enforcement and the funding wait boundary

pub mod confirmations;
pub mod hashlock;
pub mod timeouts;

pub use confirmations::{
    await_confirmation, cancel_pair, confirmations_met, required_confirmations, CancelHandle,
    CancelSignal, ConfirmationSource, FundingTarget, WaitPolicy,
};
pub use hashlock::{
    htlc_hash_lock, htlc_hash_lock_hex, strip_hex_prefix, Hashlock, Secret, SecretCommitment,
};
pub use timeouts::{calculate_refund_height, ChainClock, RefundStatus, Timelock};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger family a leg lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Script-based UTXO chain
    Bitcoin,
    Evm,
    Starknet,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Evm => "evm",
            Chain::Starknet => "starknet",
        }
    }

    pub fn is_account_chain(&self) -> bool {
        !matches!(self, Chain::Bitcoin)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
