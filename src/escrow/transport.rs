// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Transport seams for the account-chain escrow clients
//!
//! Signer and provider handles are injected through these traits; the
//! clients never read ambient wallet state. A failing transport surfaces
//! as an error, never as a fabricated transaction hash.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::errors::SwapError;
use crate::swap::strip_hex_prefix;

/// Revert reason an escrow reports when the secret does not open the hashlock.
pub const INVALID_SECRET_REASON: &str = "InvalidSecret";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The chain executed the call and rejected it
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The call never reached the chain (RPC down, signer refused, ...)
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

impl From<TransportError> for SwapError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Reverted(reason) if reason == INVALID_SECRET_REASON => SwapError::InvalidSecret,
            other => SwapError::RemoteRejected(other.to_string()),
        }
    }
}

// ============================================================================
// EVM
// ============================================================================

/// Encoded EVM call that can be dispatched via a transport.
#[derive(Clone, Debug)]
pub struct EvmCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
}

impl EvmCall {
    pub fn new(to: Address, data: impl Into<Bytes>, value: U256) -> Self {
        Self {
            to,
            data: data.into(),
            value,
            gas_limit: None,
        }
    }

    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }
}

/// Mined transaction plus the call's return data (from the transport's
/// pre-flight `eth_call` or decoded logs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallReceipt {
    pub tx_hash: B256,
    pub output: Bytes,
}

/// Sending signed EVM transactions from one account.
pub trait EvmTransport: Send + Sync {
    fn send(&self, call: EvmCall) -> TransportResult<CallReceipt>;

    /// Account that signs every `send`.
    fn sender(&self) -> Address;
}

/// Read-only `eth_call` style interactions.
pub trait EvmViewTransport: Send + Sync {
    fn call_view(&self, call: EvmCall) -> TransportResult<Bytes>;

    /// Timestamp of the latest block.
    fn block_timestamp(&self) -> TransportResult<u64>;
}

// ============================================================================
// STARKNET
// ============================================================================

/// A Starknet field element: an integer below the STARK prime
/// `2^251 + 17 * 2^192 + 1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Felt(U256);

impl Felt {
    pub const ZERO: Felt = Felt(U256::ZERO);

    pub fn prime() -> U256 {
        (U256::from(1u8) << 251) + (U256::from(17u8) << 192) + U256::from(1u8)
    }

    pub fn new(value: U256) -> Result<Self, SwapError> {
        if value >= Self::prime() {
            return Err(SwapError::InvalidAddress(format!(
                "0x{:x} exceeds the felt range",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn from_u64(value: u64) -> Self {
        Self(U256::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    pub fn is_true(&self) -> bool {
        !self.0.is_zero()
    }

    /// Split a `u256` into Cairo's `(low, high)` felt pair.
    pub fn split_u256(value: U256) -> (Felt, Felt) {
        let mask = (U256::from(1u8) << 128) - U256::from(1u8);
        (Felt(value & mask), Felt(value >> 128))
    }

    /// Inverse of [`Felt::split_u256`]. Fails if either half exceeds 128 bits.
    pub fn join_u256(low: Felt, high: Felt) -> Result<U256, SwapError> {
        let limit = U256::from(1u8) << 128;
        if low.0 >= limit || high.0 >= limit {
            return Err(SwapError::RemoteRejected("u256 limb exceeds 128 bits".into()));
        }
        Ok(low.0 | (high.0 << 128))
    }
}

impl FromStr for Felt {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, SwapError> {
        let body = strip_hex_prefix(s);
        let value = U256::from_str_radix(body, 16)
            .map_err(|e| SwapError::InvalidAddress(format!("felt {}: {}", s, e)))?;
        Felt::new(value)
    }
}

impl fmt::Display for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Debug for Felt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Felt(0x{:x})", self.0)
    }
}

impl Serialize for Felt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Felt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One contract entry point invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StarknetCall {
    pub contract: Felt,
    /// Entry point name; the transport derives the selector
    pub entry_point: &'static str,
    pub calldata: Vec<Felt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeReceipt {
    pub tx_hash: Felt,
    /// Values returned by the entry point
    pub result: Vec<Felt>,
}

/// Account-abstracted Starknet access for one signing account.
pub trait StarknetTransport: Send + Sync {
    fn invoke(&self, call: StarknetCall) -> TransportResult<InvokeReceipt>;

    fn call(&self, call: StarknetCall) -> TransportResult<Vec<Felt>>;

    fn caller(&self) -> Felt;

    fn block_timestamp(&self) -> TransportResult<u64>;
}
