// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Confirmation depth enforcement and the funding wait boundary
//!
//! Funding is observed by something outside the core (a chain watcher or an
//! operator). The core only polls a [`ConfirmationSource`] until the required
//! depth is reached, the caller's timeout expires, or the caller cancels.
//! None of these outcomes touch order state.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::Chain;
use crate::config::SwapConfig;
use crate::errors::{Result, SwapError};

/// Default confirmations before a swap may advance
///
/// - BTC: 3 (~30 minutes)
/// - EVM: 12
/// - Starknet: 1 (accepted on L2)
pub fn required_confirmations(chain: Chain) -> u32 {
    SwapConfig::default().required_confirmations(chain)
}

/// Check if observed confirmations meet the requirement
pub fn confirmations_met(chain: Chain, observed: u32) -> bool {
    observed >= required_confirmations(chain)
}

/// Human-readable confirmation status message
pub fn confirmation_status_message(observed: u32, required: u32) -> String {
    if observed >= required {
        format!("✓ {}/{} confirmations (ready)", observed, required)
    } else {
        format!("⏳ {}/{} confirmations (waiting)", observed, required)
    }
}

/// Something whose confirmation depth can be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingTarget {
    pub chain: Chain,
    /// Txid, escrow address or transaction hash, chain-native encoding
    pub reference: String,
}

impl FundingTarget {
    pub fn new(chain: Chain, reference: impl Into<String>) -> Self {
        Self {
            chain,
            reference: reference.into(),
        }
    }
}

/// Chain watcher reporting the current depth of a funding transaction.
pub trait ConfirmationSource: Send + Sync {
    fn confirmations(&self, target: &FundingTarget) -> Result<u32>;
}

/// Bounds for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub required: u32,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl WaitPolicy {
    pub fn from_config(config: &SwapConfig, chain: Chain) -> Self {
        Self {
            required: config.required_confirmations(chain),
            poll_interval: config.poll_interval(),
            timeout: config.confirmation_timeout(),
        }
    }
}

/// Caller side of a cancellable wait.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Waiter side; cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped uncancelled.
    async fn cancelled(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Poll `source` until `target` reaches `policy.required` confirmations.
///
/// Returns the observed depth, `ConfirmationTimeout` when the deadline
/// passes first, or `WaitCancelled` when the caller cancels.
pub async fn await_confirmation<S>(
    source: &S,
    target: &FundingTarget,
    policy: &WaitPolicy,
    cancel: &mut CancelSignal,
) -> Result<u32>
where
    S: ConfirmationSource + ?Sized,
{
    // A timeout past the clock's range never expires
    let deadline = Instant::now().checked_add(policy.timeout);

    loop {
        if cancel.is_cancelled() {
            return Err(SwapError::WaitCancelled);
        }

        let observed = source.confirmations(target)?;
        tracing::debug!(
            chain = ?target.chain,
            reference = %target.reference,
            "{}",
            confirmation_status_message(observed, policy.required)
        );
        if observed >= policy.required {
            tracing::info!(
                "✅ {} funding {} confirmed at depth {}",
                target.chain,
                target.reference,
                observed
            );
            return Ok(observed);
        }

        let now = Instant::now();
        if deadline.map_or(false, |deadline| now >= deadline) {
            tracing::warn!(
                "⏳ confirmation wait for {} timed out at {}/{}",
                target.reference,
                observed,
                policy.required
            );
            return Err(SwapError::ConfirmationTimeout {
                observed,
                required: policy.required,
            });
        }

        let nap = match deadline {
            Some(deadline) => policy.poll_interval.min(deadline - now),
            None => policy.poll_interval,
        };
        tokio::select! {
            _ = tokio::time::sleep(nap) => {}
            _ = cancel.cancelled() => return Err(SwapError::WaitCancelled),
        }
    }
}
