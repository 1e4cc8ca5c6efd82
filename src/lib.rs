// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! AtomicX swap core
//!
//! Hash time-locked cross-chain swaps between a bitcoin script lock and an
//! account-chain escrow (EVM factory escrows or a Starknet HTLC).
//!
//! - [`swap`]: secrets, hashlocks, timelocks, confirmation waits
//! - [`btc`]: lock script derivation and claim/refund spends
//! - [`escrow`]: escrow clients over pluggable transports
//! - [`leg`]: one claim/refund interface over both leg kinds
//! - [`order`]: order state machine, stores and the swap engine

pub mod btc;
pub mod config;
pub mod errors;
pub mod escrow;
pub mod leg;
pub mod order;
pub mod swap;
pub mod telemetry;

pub use errors::{Result, SwapError};
pub use leg::{BitcoinLeg, EscrowLeg, LegReceipt, LockLeg};
pub use order::{OrderStatus, OrderStore, SwapEngine, SwapEvent, SwapOrder};
pub use swap::{Chain, Hashlock, Secret, SecretCommitment};
