// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap error taxonomy
//!
//! One closed enum for every failure the core can surface. Cryptographic and
//! structural errors are raised locally before any network call; remote
//! failures always arrive as `RemoteRejected` (or `InvalidSecret` when the
//! escrow's hash check is the reason), never as a fabricated success.

use thiserror::Error;

use crate::order::OrderStatus;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SwapError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Invalid hashlock encoding: {0}")]
    InvalidHashlockEncoding(String),

    #[error("Insufficient funds: amount {amount} does not cover fee {fee}")]
    InsufficientFunds { amount: u64, fee: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Timelock not reached: required {required}, requested {requested}")]
    TimelockNotReached { required: u64, requested: u64 },

    #[error("Cancellation period not elapsed: now {now}, cancellable at {cancellable_at}")]
    CancellationPeriodNotElapsed { now: u64, cancellable_at: u64 },

    #[error("Secret does not hash to the hashlock")]
    SecretMismatch,

    #[error("Remote escrow rejected the secret")]
    InvalidSecret,

    #[error("Unauthorized: expected {expected}, caller is {actual}")]
    Unauthorized { expected: String, actual: String },

    #[error("Invalid state transition: {event} not allowed from {from}")]
    InvalidStateTransition { from: OrderStatus, event: String },

    #[error("Remote rejected call: {0}")]
    RemoteRejected(String),

    #[error("Hashlock mismatch: order {expected}, observed {observed}")]
    HashlockMismatch { expected: String, observed: String },

    #[error("Lock address mismatch: derived {expected}, funded {observed}")]
    LockAddressMismatch { expected: String, observed: String },

    #[error("Escrow already withdrawn or cancelled")]
    EscrowAlreadySettled,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid timelocks: {0}")]
    InvalidTimelocks(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order already exists: {0}")]
    DuplicateOrder(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Confirmation wait timed out at {observed}/{required} confirmations")]
    ConfirmationTimeout { observed: u32, required: u32 },

    #[error("Confirmation wait cancelled")]
    WaitCancelled,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SwapError {
    /// Whether the same step may be retried as-is.
    ///
    /// State-machine rejections need a fresh read of on-chain state first,
    /// and local cryptographic failures will fail identically again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwapError::RemoteRejected(_)
                | SwapError::Storage(_)
                | SwapError::ConfirmationTimeout { .. }
                | SwapError::TimelockNotReached { .. }
                | SwapError::CancellationPeriodNotElapsed { .. }
        )
    }

    /// True for errors detected before anything touched a network.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            SwapError::RemoteRejected(_) | SwapError::InvalidSecret | SwapError::Storage(_)
        )
    }
}

impl From<sled::Error> for SwapError {
    fn from(err: sled::Error) -> Self {
        SwapError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SwapError {
    fn from(err: serde_json::Error) -> Self {
        SwapError::Storage(format!("serialization: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transition_not_retryable() {
        let err = SwapError::InvalidStateTransition {
            from: OrderStatus::SourceLockFunded,
            event: "Settle".to_string(),
        };
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("SOURCE_LOCK_FUNDED"));
        assert!(msg.contains("Settle"));
    }

    #[test]
    fn test_remote_errors_are_not_local() {
        assert!(!SwapError::RemoteRejected("reverted".into()).is_local());
        assert!(SwapError::SecretMismatch.is_local());
        assert!(SwapError::InsufficientFunds { amount: 1, fee: 2 }.is_local());
    }

    #[test]
    fn test_error_messages() {
        let err = SwapError::TimelockNotReached {
            required: 144,
            requested: 100,
        };
        assert!(err.to_string().contains("144"));

        let err = SwapError::InsufficientFunds { amount: 500, fee: 1000 };
        assert!(err.to_string().contains("500"));

        let err = SwapError::InvalidAmount("escrow amount must be nonzero".into());
        assert!(!err.to_string().contains("fee"));
        assert!(err.is_local());
    }
}
