// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

use alloy_primitives::Address;
use bitcoin::Network;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::errors::{Result, SwapError};
use crate::escrow::Felt;

/// Chain endpoints and deployed contract locations.
///
/// The swap core only consumes these values; selecting or switching networks
/// is the embedder's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Bitcoin network used for address derivation and destination checks
    pub bitcoin_network: Network,

    /// EVM chain id the escrow factory lives on
    pub evm_chain_id: u64,

    /// Escrow factory (createSrcEscrow / createDstEscrow)
    pub evm_factory: Address,

    /// Starknet HTLC contract address (hex felt). The contract must take a
    /// `u256` hashlock; there is no default deployment.
    pub starknet_htlc: String,

    // =================== RPC endpoints (passed through to transports) ===================
    pub bitcoin_rpc_url: Option<String>,

    pub evm_rpc_url: Option<String>,

    pub starknet_rpc_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bitcoin_network: Network::Testnet,
            evm_chain_id: 11_155_111, // Sepolia
            evm_factory: Address::from_str("0x46dD29f29FB4816A4E7bd1Dc6458d1dFCA097993")
                .unwrap_or(Address::ZERO),
            starknet_htlc: String::new(),
            bitcoin_rpc_url: None,
            evm_rpc_url: Some("https://sepolia.drpc.org".to_string()),
            starknet_rpc_url: None,
        }
    }
}

impl NetworkConfig {
    /// Load configuration from environment variables over the defaults.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // ATOMICX_BITCOIN_NETWORK: bitcoin | testnet | signet | regtest
        if let Ok(val) = env::var("ATOMICX_BITCOIN_NETWORK") {
            match parse_bitcoin_network(&val) {
                Some(network) => config.bitcoin_network = network,
                None => tracing::warn!("ignoring unknown ATOMICX_BITCOIN_NETWORK={}", val),
            }
        }

        if let Ok(val) = env::var("ATOMICX_EVM_CHAIN_ID") {
            if let Ok(num) = val.trim().parse::<u64>() {
                config.evm_chain_id = num;
            }
        }

        if let Ok(val) = env::var("ATOMICX_EVM_FACTORY") {
            match Address::from_str(val.trim()) {
                Ok(addr) => config.evm_factory = addr,
                Err(e) => tracing::warn!("ignoring ATOMICX_EVM_FACTORY: {}", e),
            }
        }

        if let Ok(val) = env::var("ATOMICX_STARKNET_HTLC") {
            config.starknet_htlc = val.trim().to_string();
        }

        if let Ok(val) = env::var("ATOMICX_BITCOIN_RPC_URL") {
            config.bitcoin_rpc_url = Some(val);
        }
        if let Ok(val) = env::var("ATOMICX_EVM_RPC_URL") {
            config.evm_rpc_url = Some(val);
        }
        if let Ok(val) = env::var("ATOMICX_STARKNET_RPC_URL") {
            config.starknet_rpc_url = Some(val);
        }

        config
    }

    /// Configured Starknet HTLC as a felt.
    pub fn starknet_htlc_address(&self) -> Result<Felt> {
        let raw = self.starknet_htlc.trim();
        if raw.is_empty() {
            return Err(SwapError::Config("no Starknet HTLC configured (ATOMICX_STARKNET_HTLC)".into()));
        }
        raw.parse()
    }
}

/// Accepts the rust-bitcoin names plus `mainnet` and `testnet4`.
pub fn parse_bitcoin_network(name: &str) -> Option<Network> {
    match name.trim().to_ascii_lowercase().as_str() {
        "bitcoin" | "mainnet" => Some(Network::Bitcoin),
        "testnet" | "testnet3" | "testnet4" => Some(Network::Testnet),
        "signet" => Some(Network::Signet),
        "regtest" => Some(Network::Regtest),
        _ => None,
    }
}
