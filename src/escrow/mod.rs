// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Account-chain escrow legs (EVM factory escrows, Starknet HTLC)
//!
//! Every client runs the same local fast-fail checks before touching the
//! network: caller identity, secret hash and cancellation window. The chain
//! stays authoritative; passing them does not guarantee acceptance.

pub mod evm;
pub mod immutables;
#[cfg(any(test, feature = "test-utils"))]
pub mod simulated;
pub mod starknet;
pub mod transport;

pub use evm::EvmEscrowClient;
pub use immutables::{EscrowImmutables, Identity, Timelocks};
pub use starknet::StarknetEscrowClient;
pub use transport::{
    CallReceipt, EvmCall, EvmTransport, EvmViewTransport, Felt, InvokeReceipt, StarknetCall,
    StarknetTransport, TransportError, TransportResult,
};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SwapError};
use crate::swap::{Chain, Secret};

/// Which creation entry point an escrow came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscrowRole {
    Source,
    Destination,
}

impl EscrowRole {
    pub fn from_is_source(role_is_source: bool) -> Self {
        if role_is_source {
            EscrowRole::Source
        } else {
            EscrowRole::Destination
        }
    }
}

/// A created escrow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowHandle {
    pub chain: Chain,
    /// Escrow contract address (EVM) or HTLC id (Starknet)
    pub locator: String,
    /// Immutables as deployed, including the `deployed_at` stamp
    pub immutables: EscrowImmutables,
    pub role: EscrowRole,
    pub creation_tx: String,
}

/// Read-only view of an escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowDetails {
    pub immutables: EscrowImmutables,
    pub withdrawn: bool,
    pub cancelled: bool,
}

impl EscrowDetails {
    pub fn is_settled(&self) -> bool {
        self.withdrawn || self.cancelled
    }
}

/// Account-chain escrow call surface.
///
/// Clients are stateless with respect to orders: everything an operation
/// needs arrives in its arguments or the handle.
pub trait EscrowClient: Send + Sync {
    fn chain(&self) -> Chain;

    /// Identity whose signature the transport attaches.
    fn caller(&self) -> Identity;

    /// Create and fund an escrow. The value attached is `amount`, plus
    /// `safety_deposit` when `role_is_source`. No client-side dedup.
    fn create_escrow(&self, immutables: &EscrowImmutables, role_is_source: bool) -> Result<EscrowHandle>;

    /// Release funds to the taker by revealing `secret`. Returns the tx hash.
    fn withdraw(&self, handle: &EscrowHandle, secret: &Secret) -> Result<String>;

    /// Return funds to the maker once the cancellation period has elapsed.
    fn cancel(&self, handle: &EscrowHandle) -> Result<String>;

    fn get_details(&self, handle: &EscrowHandle) -> Result<EscrowDetails>;
}

/// Local withdraw checks: designated taker and a secret that opens the lock.
pub fn check_withdraw(immutables: &EscrowImmutables, caller: &Identity, secret: &Secret) -> Result<()> {
    if *caller != immutables.taker {
        return Err(SwapError::Unauthorized {
            expected: immutables.taker.to_string(),
            actual: caller.to_string(),
        });
    }
    if !secret.opens(&immutables.hashlock) {
        return Err(SwapError::SecretMismatch);
    }
    Ok(())
}

/// Local cancel checks: designated maker and the cancellation window open at `now`.
pub fn check_cancel(immutables: &EscrowImmutables, caller: &Identity, now: u64) -> Result<()> {
    if *caller != immutables.maker {
        return Err(SwapError::Unauthorized {
            expected: immutables.maker.to_string(),
            actual: caller.to_string(),
        });
    }
    let cancellable_at = immutables.timelocks.cancellation_start();
    if now < cancellable_at {
        return Err(SwapError::CancellationPeriodNotElapsed { now, cancellable_at });
    }
    Ok(())
}
